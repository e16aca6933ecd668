//! Last-rejection reason per chat, read by the `/why` command.
//!
//! One record per channel; a newer rejection overwrites the older one.
//! Updates are last-write-wins with no sequencing: a later message whose
//! pipeline finishes first can be overwritten by an earlier message still
//! waiting on the classifier.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::pipeline::types::RejectionKind;

/// Answer when nothing has been removed in a channel.
pub const NOTHING_REMOVED: &str = "Останнім часом у цьому каналі нічого не видалялося.";

/// Why the latest message in a channel was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionRecord {
    pub channel_id: String,
    pub author_name: String,
    pub kind: RejectionKind,
    pub rejected_at: DateTime<Utc>,
}

impl RejectionRecord {
    pub fn new(
        channel_id: impl Into<String>,
        author_name: impl Into<String>,
        kind: RejectionKind,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            author_name: author_name.into(),
            kind,
            rejected_at: Utc::now(),
        }
    }

    /// Human-readable reason, e.g. `Користувач alice: ...`.
    pub fn reason_text(&self) -> String {
        format!("Користувач {}: {}", self.author_name, self.kind.reason_text())
    }
}

/// In-memory map of channel → latest rejection.
#[derive(Default)]
pub struct ReasonLedger {
    records: RwLock<HashMap<String, RejectionRecord>>,
}

impl ReasonLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record`, replacing any previous record for its channel.
    pub fn record(&self, record: RejectionRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.channel_id.clone(), record);
    }

    /// Latest rejection for `channel_id`, if any.
    pub fn get(&self, channel_id: &str) -> Option<RejectionRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    /// Reason text for `channel_id`, or [`NOTHING_REMOVED`].
    pub fn reason_for(&self, channel_id: &str) -> String {
        self.get(channel_id)
            .map(|r| r.reason_text())
            .unwrap_or_else(|| NOTHING_REMOVED.to_string())
    }

    /// Number of channels with a recorded rejection.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_channel_reports_nothing_removed() {
        let ledger = ReasonLedger::new();
        assert!(ledger.get("-100").is_none());
        assert_eq!(ledger.reason_for("-100"), NOTHING_REMOVED);
    }

    #[test]
    fn record_then_read() {
        let ledger = ReasonLedger::new();
        ledger.record(RejectionRecord::new(
            "-100",
            "alice",
            RejectionKind::ForbiddenCharacter,
        ));

        let reason = ledger.reason_for("-100");
        assert!(reason.starts_with("Користувач alice: "));
        assert!(reason.contains(RejectionKind::ForbiddenCharacter.reason_text()));
    }

    #[test]
    fn record_is_stamped_when_created() {
        let before = Utc::now();
        let record = RejectionRecord::new("-100", "alice", RejectionKind::Classifier);
        let after = Utc::now();
        assert!(before <= record.rejected_at && record.rejected_at <= after);
    }

    #[test]
    fn newer_rejection_overwrites() {
        let ledger = ReasonLedger::new();
        ledger.record(RejectionRecord::new("-100", "alice", RejectionKind::ForbiddenCharacter));
        ledger.record(RejectionRecord::new("-100", "bob", RejectionKind::Classifier));

        let record = ledger.get("-100").unwrap();
        assert_eq!(record.author_name, "bob");
        assert_eq!(record.kind, RejectionKind::Classifier);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn channels_are_independent() {
        let ledger = ReasonLedger::new();
        ledger.record(RejectionRecord::new("-100", "alice", RejectionKind::ForbiddenMarkerWord));
        ledger.record(RejectionRecord::new("-200", "bob", RejectionKind::Classifier));

        assert_eq!(ledger.get("-100").unwrap().author_name, "alice");
        assert_eq!(ledger.get("-200").unwrap().author_name, "bob");
        assert_eq!(ledger.reason_for("-300"), NOTHING_REMOVED);
    }
}
