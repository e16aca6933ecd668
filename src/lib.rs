//! Mova Guard: keeps a group chat in Ukrainian.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
