//! In-process state: the learned whitelist and the rejection ledger.

pub mod ledger;
pub mod vocabulary;

pub use ledger::{NOTHING_REMOVED, ReasonLedger, RejectionRecord};
pub use vocabulary::VocabularyCache;
