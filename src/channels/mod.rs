//! Chat gateways: where messages come from and where deletions go.

pub mod gateway;
pub mod telegram;

pub use gateway::*;
pub use telegram::TelegramChannel;
