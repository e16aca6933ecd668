//! Shared types for the moderation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// Where a message lives, enough to delete it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat / channel identifier.
    pub channel_id: String,
    /// Gateway-native message identifier within the channel.
    pub message_id: String,
}

/// A chat message delivered by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_ref: MessageRef,
    /// Stable author identifier.
    pub author_id: String,
    /// Name shown in rejection reasons.
    pub author_name: String,
    /// Message body.
    pub content: String,
    /// Messages from bots are never moderated.
    pub is_bot: bool,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let author_name = author_name.into();
        Self {
            message_ref: MessageRef {
                channel_id: channel_id.into(),
                message_id: message_id.into(),
            },
            author_id: author_name.clone(),
            author_name,
            content: content.into(),
            is_bot: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = author_id.into();
        self
    }

    pub fn from_bot(mut self, is_bot: bool) -> Self {
        self.is_bot = is_bot;
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.message_ref.channel_id
    }
}

// ── Decisions ───────────────────────────────────────────────────────

/// Tri-state classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationDecision {
    Violating,
    Acceptable,
    /// No usable answer; the message is left alone.
    Indeterminate,
}

/// Why a message was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Contains a letter that only exists in Russian.
    ForbiddenCharacter,
    /// Contains a Russian marker word.
    ForbiddenMarkerWord,
    /// An external model flagged it.
    Classifier,
}

impl RejectionKind {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ForbiddenCharacter => "forbidden_character",
            Self::ForbiddenMarkerWord => "forbidden_marker_word",
            Self::Classifier => "classifier",
        }
    }

    /// Explanation shown to chat members via `/why`.
    pub fn reason_text(&self) -> &'static str {
        match self {
            Self::ForbiddenCharacter => {
                "Повідомлення містить символи, що не використовуються в українській мові."
            }
            Self::ForbiddenMarkerWord => {
                "Спрацював автоматичний лінгвістичний фільтр (невідповідність мовним нормам чату)."
            }
            Self::Classifier => "Мовна модель ідентифікувала текст як порушення мовної політики.",
        }
    }
}

/// Result of the local checks. Anything but `Undecided` ends the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicVerdict {
    /// A word of the message is in the whitelist.
    AllowedByCache,
    /// Contains a letter unique to Ukrainian.
    AllowedBySignature,
    Rejected(RejectionKind),
    /// Too short to be worth a model call.
    TooShort,
    /// No local signal; ask the classifier.
    Undecided,
}

/// Terminal state of one message's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Bot author or empty text; not moderated.
    Skipped,
    AllowedByCache,
    AllowedBySignature,
    RejectedByHeuristic(RejectionKind),
    TooShort,
    AllowedByClassifier,
    RejectedByClassifier,
    Indeterminate,
}

impl Outcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::AllowedByCache => "allowed_by_cache",
            Self::AllowedBySignature => "allowed_by_signature",
            Self::RejectedByHeuristic(_) => "rejected_by_heuristic",
            Self::TooShort => "too_short",
            Self::AllowedByClassifier => "allowed_by_classifier",
            Self::RejectedByClassifier => "rejected_by_classifier",
            Self::Indeterminate => "indeterminate",
        }
    }

    /// Whether this outcome removes the message.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RejectedByHeuristic(_) | Self::RejectedByClassifier
        )
    }

    /// The rejection reason, if the message is removed.
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Self::RejectedByHeuristic(kind) => Some(*kind),
            Self::RejectedByClassifier => Some(RejectionKind::Classifier),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_message_builder() {
        let msg = IncomingMessage::new("-100", "42", "alice", "привіт")
            .with_author_id("7")
            .from_bot(true);
        assert_eq!(msg.channel_id(), "-100");
        assert_eq!(msg.message_ref.message_id, "42");
        assert_eq!(msg.author_id, "7");
        assert_eq!(msg.author_name, "alice");
        assert!(msg.is_bot);
    }

    #[test]
    fn author_id_defaults_to_name() {
        let msg = IncomingMessage::new("-100", "42", "alice", "hi");
        assert_eq!(msg.author_id, "alice");
        assert!(!msg.is_bot);
    }

    #[test]
    fn outcome_rejection_kind() {
        assert_eq!(
            Outcome::RejectedByHeuristic(RejectionKind::ForbiddenMarkerWord).rejection_kind(),
            Some(RejectionKind::ForbiddenMarkerWord)
        );
        assert_eq!(
            Outcome::RejectedByClassifier.rejection_kind(),
            Some(RejectionKind::Classifier)
        );
        assert_eq!(Outcome::TooShort.rejection_kind(), None);
        assert!(Outcome::RejectedByClassifier.is_rejection());
        assert!(!Outcome::Indeterminate.is_rejection());
    }

    #[test]
    fn reason_texts_are_distinct() {
        let kinds = [
            RejectionKind::ForbiddenCharacter,
            RejectionKind::ForbiddenMarkerWord,
            RejectionKind::Classifier,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.reason_text(), b.reason_text());
                assert_ne!(a.label(), b.label());
            }
        }
    }

    #[test]
    fn outcome_serialization() {
        let json =
            serde_json::to_value(Outcome::RejectedByHeuristic(RejectionKind::ForbiddenCharacter))
                .unwrap();
        assert_eq!(json["rejected_by_heuristic"], "forbidden_character");
        assert_eq!(
            serde_json::to_value(Outcome::TooShort).unwrap(),
            serde_json::json!("too_short")
        );
    }
}
