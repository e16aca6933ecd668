//! Telegram gateway. Long-polls the Bot API for updates.
//!
//! Group messages become `GatewayEvent::Message`; a `/why` command becomes
//! `GatewayEvent::Inquiry`. Telegram has no ephemeral replies, so inquiry
//! answers go to the requester's private chat with the bot.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{ChatGateway, EventStream, GatewayEvent, InquiryRequest};
use crate::error::ChannelError;
use crate::pipeline::types::{IncomingMessage, MessageRef};

/// Public Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll window for `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Command that asks why the last message was removed.
const WHY_COMMAND: &str = "/why";

/// Telegram gateway, connected to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE)
    }

    /// Point the gateway at a different Bot API server.
    pub fn with_api_base(bot_token: SecretString, api_base: impl Into<String>) -> Self {
        Self {
            bot_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method and return its `result`, or the API's error text.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, String> {
        call_api(&self.client, &self.api_url(method), method, body).await
    }
}

#[async_trait]
impl ChatGateway for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("getUpdates");

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram gateway listening for messages...");

            while !tx.is_closed() {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let updates = match call_api(&client, &url, "getUpdates", &body).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let Some(updates) = updates.as_array() else {
                    continue;
                };

                for update in updates {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), ChannelError> {
        let message_id: i64 = message.message_id.parse().map_err(|_| {
            ChannelError::InvalidMessage(format!(
                "Telegram message id is not numeric: {}",
                message.message_id
            ))
        })?;

        let body = serde_json::json!({
            "chat_id": message.channel_id,
            "message_id": message_id,
        });

        self.call("deleteMessage", &body)
            .await
            .map(|_| ())
            .map_err(|reason| ChannelError::DeleteFailed {
                name: "telegram".into(),
                message_id: message.message_id.clone(),
                reason,
            })
    }

    async fn send_private_reply(
        &self,
        inquiry: &InquiryRequest,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": inquiry.requester_id,
            "text": text,
        });

        self.call("sendMessage", &body)
            .await
            .map(|_| ())
            .map_err(|reason| ChannelError::SendFailed {
                name: "telegram".into(),
                reason,
            })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|reason| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason,
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn call_api(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    body: &Value,
) -> Result<Value, String> {
    // Error text must not carry the URL: it contains the bot token.
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("{method}: {}", e.without_url()))?;

    let status = resp.status();
    let data: Value = resp
        .json()
        .await
        .map_err(|e| format!("{method} returned {status}: {}", e.without_url()))?;

    if data.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(data.get("result").cloned().unwrap_or(Value::Null));
    }

    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("no description");
    Err(format!("{method} failed ({status}): {description}"))
}

/// Whether `text` is `/why` or `/why@botname`, optionally followed by arguments.
fn is_why_command(text: &str) -> bool {
    text.split_whitespace().next().is_some_and(|command| {
        command == WHY_COMMAND
            || command
                .strip_prefix(WHY_COMMAND)
                .is_some_and(|rest| rest.starts_with('@'))
    })
}

/// Turn one `getUpdates` entry into an event. Non-text updates yield `None`.
pub fn parse_update(update: &Value) -> Option<GatewayEvent> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();
    let message_id = message.get("message_id").and_then(Value::as_i64)?;

    let from = message.get("from");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());
    let is_bot = from
        .and_then(|f| f.get("is_bot"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let author_name = from
        .and_then(|f| f.get("username").or_else(|| f.get("first_name")))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    if is_why_command(text) {
        if is_bot {
            return None;
        }
        return Some(GatewayEvent::Inquiry(InquiryRequest {
            channel_id: chat_id,
            requester_id: user_id?,
            requester_name: author_name,
        }));
    }

    let mut incoming =
        IncomingMessage::new(chat_id, message_id.to_string(), author_name, text).from_bot(is_bot);
    if let Some(id) = user_id {
        incoming = incoming.with_author_id(id);
    }
    Some(GatewayEvent::Message(incoming))
}

// ── Tests ───────────────────────────────────────────────────────────
