//! Decision engine: runs each chat message through the moderation pipeline.
//!
//! Flow per message:
//! 1. Local heuristic (whitelist, letter signatures, marker words, length)
//! 2. Classifier fallback, only when the heuristic is undecided
//! 3. Side effects: delete + record reason, or learn words, or nothing
//!
//! The engine owns all mutable moderation state. Each message is handled on
//! its own task, so a message waiting on the classifier never delays the
//! next one.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::channels::{ChatGateway, EventStream, GatewayEvent, InquiryRequest};
use crate::config::ModeratorConfig;
use crate::pipeline::governor::ClassifierGovernor;
use crate::pipeline::heuristic::LexicalHeuristic;
use crate::pipeline::types::{
    HeuristicVerdict, IncomingMessage, ModerationDecision, Outcome, RejectionKind,
};
use crate::store::{ReasonLedger, RejectionRecord, VocabularyCache};

/// Prefix of every `/why` answer.
const WHY_PREFIX: &str = "🧐 Причина видалення:";

/// Per-message moderation pipeline and its shared state.
pub struct DecisionEngine {
    vocabulary: Arc<VocabularyCache>,
    heuristic: LexicalHeuristic,
    governor: Arc<ClassifierGovernor>,
    ledger: ReasonLedger,
    gateway: Arc<dyn ChatGateway>,
}

impl DecisionEngine {
    pub fn new(
        config: &ModeratorConfig,
        vocabulary: Arc<VocabularyCache>,
        governor: Arc<ClassifierGovernor>,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        Self {
            heuristic: LexicalHeuristic::new(Arc::clone(&vocabulary), config.min_message_chars),
            vocabulary,
            governor,
            ledger: ReasonLedger::new(),
            gateway,
        }
    }

    pub fn vocabulary(&self) -> &VocabularyCache {
        &self.vocabulary
    }

    pub fn governor(&self) -> &ClassifierGovernor {
        &self.governor
    }

    pub fn ledger(&self) -> &ReasonLedger {
        &self.ledger
    }

    /// Consume `events` until the stream ends or `shutdown` resolves.
    ///
    /// Every event runs on its own task. Before returning, waits for all
    /// in-flight tasks so no message stops between recording a reason and
    /// deleting.
    pub async fn serve<S>(self: Arc<Self>, mut events: EventStream, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, finishing in-flight messages...");
                    break;
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    report_task(finished);
                }
                event = events.next() => match event {
                    Some(event) => {
                        let engine = Arc::clone(&self);
                        tasks.spawn(async move { engine.handle_event(event).await });
                    }
                    None => {
                        info!("Gateway stream ended, finishing in-flight messages...");
                        break;
                    }
                },
            }
        }

        let pending = tasks.len();
        if pending > 0 {
            debug!(pending, "Waiting for message tasks");
        }
        while let Some(finished) = tasks.join_next().await {
            report_task(finished);
        }
    }

    /// Handle one gateway event to completion.
    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Message(message) => {
                self.process(&message).await;
            }
            GatewayEvent::Inquiry(inquiry) => self.answer_inquiry(&inquiry).await,
        }
    }

    /// Run `message` to a terminal outcome and apply its side effects.
    pub async fn process(&self, message: &IncomingMessage) -> Outcome {
        if message.is_bot || message.content.trim().is_empty() {
            return Outcome::Skipped;
        }

        let outcome = match self.heuristic.evaluate(&message.content) {
            HeuristicVerdict::AllowedByCache => Outcome::AllowedByCache,
            HeuristicVerdict::AllowedBySignature => {
                self.learn(&message.content).await;
                Outcome::AllowedBySignature
            }
            HeuristicVerdict::Rejected(kind) => {
                self.reject(message, kind).await;
                Outcome::RejectedByHeuristic(kind)
            }
            HeuristicVerdict::TooShort => Outcome::TooShort,
            HeuristicVerdict::Undecided => match self.governor.classify(&message.content).await {
                ModerationDecision::Violating => {
                    self.reject(message, RejectionKind::Classifier).await;
                    Outcome::RejectedByClassifier
                }
                ModerationDecision::Acceptable => {
                    self.learn(&message.content).await;
                    Outcome::AllowedByClassifier
                }
                ModerationDecision::Indeterminate => Outcome::Indeterminate,
            },
        };

        debug!(
            channel = %message.channel_id(),
            message_id = %message.message_ref.message_id,
            outcome = outcome.label(),
            elapsed_ms = (Utc::now() - message.received_at).num_milliseconds(),
            "Message processed"
        );
        outcome
    }

    /// Text answered to `/why` in `channel_id`.
    pub fn why(&self, channel_id: &str) -> String {
        format!("{WHY_PREFIX} {}", self.ledger.reason_for(channel_id))
    }

    /// Answer a `/why` request privately. Send failures are logged only.
    pub async fn answer_inquiry(&self, inquiry: &InquiryRequest) {
        let removed_at = self
            .ledger
            .get(&inquiry.channel_id)
            .map(|record| record.rejected_at.to_rfc3339());
        debug!(
            channel = %inquiry.channel_id,
            requester = %inquiry.requester_name,
            removed_at = removed_at.as_deref().unwrap_or("never"),
            "Answering /why"
        );

        let text = self.why(&inquiry.channel_id);
        if let Err(e) = self.gateway.send_private_reply(inquiry, &text).await {
            warn!(
                channel = %inquiry.channel_id,
                requester = %inquiry.requester_name,
                error = %e,
                "Failed to answer /why"
            );
        }
    }

    /// Record the reason, then delete. The record stands even if the delete fails.
    async fn reject(&self, message: &IncomingMessage, kind: RejectionKind) {
        self.ledger.record(RejectionRecord::new(
            message.channel_id(),
            &message.author_name,
            kind,
        ));

        info!(
            channel = %message.channel_id(),
            author = %message.author_name,
            reason = kind.label(),
            "Removing message"
        );

        if let Err(e) = self.gateway.delete_message(&message.message_ref).await {
            warn!(
                channel = %message.channel_id(),
                message_id = %message.message_ref.message_id,
                error = %e,
                "Delete failed, ignoring"
            );
        }
    }

    /// Learn words from confirmed-Ukrainian text. A storage error loses this
    /// batch but never aborts the message.
    async fn learn(&self, text: &str) {
        match self.vocabulary.learn(text).await {
            Ok(0) => {}
            Ok(added) => debug!(added, "Learned new words"),
            Err(e) => error!(error = %e, "Failed to extend whitelist"),
        }
    }
}

fn report_task(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!(error = %e, "Message task panicked");
        }
    }
}
