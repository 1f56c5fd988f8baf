//! # Transcription History
//!
//! An append-only, in-memory record of successful transcriptions. Entries
//! are never mutated or removed and are lost on restart.
//!
//! ## Thread Safety:
//! The ledger is an `Arc<RwLock<Vec<_>>>`: cloning the ledger shares the
//! same underlying list, appends take the write lock, reads take the read
//! lock and copy out the requested window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// One successful transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub filename: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub language: String,
    pub text: String,
    pub model_size: String,
}

impl HistoryEntry {
    /// Build an entry with a fresh id and the current UTC time.
    pub fn new(filename: Option<String>, language: String, text: String, model_size: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename,
            timestamp: Utc::now(),
            language,
            text,
            model_size,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryLedger {
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry);
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
