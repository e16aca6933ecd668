//! Learned whitelist of Ukrainian words.
//!
//! The in-memory set answers `contains` without touching disk. New words
//! are appended to the backing file (one lowercase word per line) and then
//! inserted into the set, both under a single async mutex so concurrent
//! learners never write the same word twice or interleave lines.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

use regex::Regex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::VocabularyError;

/// Ukrainian letters plus apostrophe. Excludes ы, ё, э, ъ.
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[а-щьюяіїєґ']+").expect("word pattern is valid"));

/// Append-only set of known-acceptable words.
pub struct VocabularyCache {
    path: PathBuf,
    words: RwLock<HashSet<String>>,
    write_lock: Mutex<()>,
    min_word_chars: usize,
}

impl VocabularyCache {
    /// Load the whitelist from `path`. A missing file yields an empty cache.
    pub async fn load(
        path: impl Into<PathBuf>,
        min_word_chars: usize,
    ) -> Result<Self, VocabularyError> {
        let path = path.into();
        let words = match fs::read_to_string(&path).await {
            Ok(contents) => contents
                .lines()
                .map(|line| line.trim().to_lowercase())
                .filter(|line| !line.is_empty())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Whitelist file not found, starting empty");
                HashSet::new()
            }
            Err(source) => {
                return Err(VocabularyError::Load {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        info!(path = %path.display(), words = words.len(), "Whitelist loaded");
        Ok(Self::with_words(path, words, min_word_chars))
    }

    fn with_words(path: PathBuf, words: HashSet<String>, min_word_chars: usize) -> Self {
        Self {
            path,
            words: RwLock::new(words),
            write_lock: Mutex::new(()),
            min_word_chars,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Case-insensitive exact-match lookup.
    pub fn contains(&self, word: &str) -> bool {
        let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
        if words.contains(word) {
            return true;
        }
        let lower = word.to_lowercase();
        lower != word && words.contains(&lower)
    }

    /// Number of known words.
    pub fn len(&self) -> usize {
        self.words
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tokenize `text` into lowercase words long enough to learn that
    /// are not yet known. Each word appears at most once.
    pub fn extract_candidates(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();

        WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|w| w.chars().count() >= self.min_word_chars)
            .filter(|w| !words.contains(*w))
            .filter(|w| seen.insert(*w))
            .map(str::to_string)
            .collect()
    }

    /// Persist and remember every entry not already known.
    ///
    /// Returns how many words were actually added. On a write failure
    /// nothing from this batch is added to memory.
    pub async fn add_all(&self, entries: Vec<String>) -> Result<usize, VocabularyError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        // Re-check under the lock: another learner may have won the race.
        let fresh: Vec<String> = {
            let words = self.words.read().unwrap_or_else(PoisonError::into_inner);
            let mut batch = HashSet::new();
            entries
                .into_iter()
                .map(|w| w.to_lowercase())
                .filter(|w| !words.contains(w) && batch.insert(w.clone()))
                .collect()
        };

        if fresh.is_empty() {
            return Ok(0);
        }

        self.append_lines(&fresh)
            .await
            .map_err(|source| VocabularyError::Append {
                path: self.path.display().to_string(),
                source,
            })?;

        let added = fresh.len();
        {
            let mut words = self.words.write().unwrap_or_else(PoisonError::into_inner);
            words.extend(fresh);
        }

        info!(added, total = self.len(), "Whitelist extended");
        Ok(added)
    }

    /// Extract candidates from `text` and add them.
    pub async fn learn(&self, text: &str) -> Result<usize, VocabularyError> {
        let candidates = self.extract_candidates(text);
        self.add_all(candidates).await
    }

    async fn append_lines(&self, words: &[String]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut buf = String::with_capacity(words.iter().map(|w| w.len() + 1).sum());
        for word in words {
            buf.push_str(word);
            buf.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
