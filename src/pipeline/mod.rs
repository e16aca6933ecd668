//! Message moderation pipeline.
//!
//! Every chat message flows through:
//! 1. `LexicalHeuristic::evaluate()`: local checks, no network
//! 2. `ClassifierGovernor::classify()`: bounded, failover model calls
//! 3. `DecisionEngine`: delete + record, learn, or leave alone

pub mod engine;
pub mod governor;
pub mod heuristic;
pub mod types;

pub use engine::DecisionEngine;
pub use governor::{ClassifierGovernor, ClassifierStats};
pub use heuristic::LexicalHeuristic;
