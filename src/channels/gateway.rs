//! Chat gateway abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::pipeline::types::{IncomingMessage, MessageRef};

/// A `/why` request from a chat member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryRequest {
    /// Chat the question is about.
    pub channel_id: String,
    /// Who asked; the answer goes to them privately.
    pub requester_id: String,
    pub requester_name: String,
}

/// Something the gateway delivered.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Message(IncomingMessage),
    Inquiry(InquiryRequest),
}

/// Stream of gateway events.
pub type EventStream = Pin<Box<dyn Stream<Item = GatewayEvent> + Send>>;

/// Connection to a group chat.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Gateway name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start delivering events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Remove a message from the chat transcript.
    async fn delete_message(&self, message: &MessageRef) -> Result<(), ChannelError>;

    /// Answer an inquiry so only the requester sees it.
    async fn send_private_reply(
        &self,
        inquiry: &InquiryRequest,
        text: &str,
    ) -> Result<(), ChannelError>;

    /// Verify credentials before polling.
    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
