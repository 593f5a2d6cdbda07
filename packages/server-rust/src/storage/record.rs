//! Record types for the PMode store.
//!
//! A [`PModeRecord`] pairs the configured [`PMode`] with server-side
//! [`RecordMetadata`] that tracks its lifecycle.

use as4_core::PMode;
use serde::{Deserialize, Serialize};

/// Lifecycle metadata tracked for every stored PMode.
///
/// Persisted together with the PMode so soft-deletes survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Record version, incremented on every update.
    pub version: u32,
    /// Wall-clock time (millis since epoch) when this record was created.
    pub creation_time: i64,
    /// Wall-clock time of the last successful update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modification_time: Option<i64>,
    /// Wall-clock time of the soft delete. `None` while the record is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_time: Option<i64>,
}

impl RecordMetadata {
    /// Creates metadata for a freshly created record. Version starts at 1.
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            version: 1,
            creation_time: now,
            last_modification_time: None,
            deletion_time: None,
        }
    }

    /// Records a write: increments `version` and updates `last_modification_time`.
    pub fn on_update(&mut self, now: i64) {
        self.version = self.version.saturating_add(1);
        self.last_modification_time = Some(now);
    }

    /// Marks the record as soft-deleted at `now`.
    pub fn mark_deleted(&mut self, now: i64) {
        self.deletion_time = Some(now);
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deletion_time.is_some()
    }
}

/// A stored PMode plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PModeRecord {
    pub pmode: PMode,
    pub metadata: RecordMetadata,
}

impl PModeRecord {
    #[must_use]
    pub fn new(pmode: PMode, now: i64) -> Self {
        Self {
            pmode,
            metadata: RecordMetadata::new(now),
        }
    }

    /// The record's key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.pmode.id
    }

    /// Whether the record is visible through the live view.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.metadata.is_deleted()
    }
}
