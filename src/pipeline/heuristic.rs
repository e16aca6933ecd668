//! Local, zero-latency language checks.
//!
//! Runs before any model call, in this order:
//! 1. A whitespace token is in the whitelist → allowed
//! 2. Contains і, ї, є or ґ → allowed (and worth learning from)
//! 3. Contains ы, ё, э or ъ, or a Russian marker word → rejected
//! 4. Shorter than the triviality floor → left alone
//!
//! If none fires the verdict is `Undecided` and the classifier decides.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::pipeline::types::{HeuristicVerdict, RejectionKind};
use crate::store::VocabularyCache;

/// Letters that exist in Ukrainian but not in Russian.
pub const TARGET_UNIQUE_LETTERS: [char; 4] = ['і', 'ї', 'є', 'ґ'];

/// Letters that exist in Russian but not in Ukrainian.
pub const DISALLOWED_UNIQUE_LETTERS: [char; 4] = ['ы', 'ё', 'э', 'ъ'];

/// Frequent Russian words with no Ukrainian homograph.
pub const MARKER_WORDS: [&str; 9] = [
    "что", "это", "как", "меня", "тебя", "было", "есть", "когда", "только",
];

/// Rule-based classifier backed by the learned whitelist.
pub struct LexicalHeuristic {
    vocabulary: Arc<VocabularyCache>,
    marker_words: HashSet<&'static str>,
    min_message_chars: usize,
}

impl LexicalHeuristic {
    pub fn new(vocabulary: Arc<VocabularyCache>, min_message_chars: usize) -> Self {
        Self {
            vocabulary,
            marker_words: MARKER_WORDS.into_iter().collect(),
            min_message_chars,
        }
    }

    /// Run the local checks on `text`.
    pub fn evaluate(&self, text: &str) -> HeuristicVerdict {
        let lower = text.trim().to_lowercase();

        if lower
            .split_whitespace()
            .any(|word| self.vocabulary.contains(word))
        {
            return HeuristicVerdict::AllowedByCache;
        }

        if lower.chars().any(|c| TARGET_UNIQUE_LETTERS.contains(&c)) {
            return HeuristicVerdict::AllowedBySignature;
        }

        if lower.chars().any(|c| DISALLOWED_UNIQUE_LETTERS.contains(&c)) {
            return HeuristicVerdict::Rejected(RejectionKind::ForbiddenCharacter);
        }

        if let Some(marker) = lower
            .split_whitespace()
            .find(|word| self.marker_words.contains(*word))
        {
            debug!(marker, "Matched Russian marker word");
            return HeuristicVerdict::Rejected(RejectionKind::ForbiddenMarkerWord);
        }

        if text.chars().count() < self.min_message_chars {
            return HeuristicVerdict::TooShort;
        }

        HeuristicVerdict::Undecided
    }
}
