//! In-memory status store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{StatusEntry, StatusKey};
use crate::core::{ProcessingStatus, RecordId};
use crate::ports::{StatusStore, StatusStoreError};

/// One write observed by the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    /// The key that was written.
    pub key: StatusKey,
    /// The status that was written.
    pub status: ProcessingStatus,
    /// Whether the write came from `ensure` rather than `upsert`.
    pub ensure: bool,
}

/// A status store backed by a concurrent map.
///
/// Each key is updated atomically through the map's entry API, so sibling
/// children can be written concurrently. Every write is also appended to a
/// history log for inspection.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    entries: DashMap<StatusKey, StatusEntry>,
    history: Mutex<Vec<StatusWrite>>,
}

impl InMemoryStatusStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current entry for a key.
    #[must_use]
    pub fn get(&self, key: &StatusKey) -> Option<StatusEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every write in the order it was applied.
    #[must_use]
    pub fn history(&self) -> Vec<StatusWrite> {
        self.history.lock().clone()
    }

    /// Returns the `upsert` writes made for one key.
    #[must_use]
    pub fn updates_for(&self, key: &StatusKey) -> Vec<ProcessingStatus> {
        self.history
            .lock()
            .iter()
            .filter(|write| !write.ensure && &write.key == key)
            .map(|write| write.status)
            .collect()
    }

    fn record(&self, key: &StatusKey, status: ProcessingStatus, ensure: bool) {
        self.history.lock().push(StatusWrite {
            key: key.clone(),
            status,
            ensure,
        });
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn ensure(&self, key: &StatusKey, status: ProcessingStatus) -> Result<(), StatusStoreError> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| StatusEntry::new(key.clone(), status));
        self.record(key, status, true);
        Ok(())
    }

    async fn upsert(
        &self,
        key: &StatusKey,
        status: ProcessingStatus,
        produced_id: Option<RecordId>,
    ) -> Result<(), StatusStoreError> {
        self.entries
            .entry(key.clone())
            .and_modify(|entry| {
                entry.status = status;
                entry.updated_at = Utc::now();
                if produced_id.is_some() {
                    entry.produced_id.clone_from(&produced_id);
                }
            })
            .or_insert_with(|| StatusEntry {
                produced_id: produced_id.clone(),
                ..StatusEntry::new(key.clone(), status)
            });
        self.record(key, status, false);
        Ok(())
    }

    async fn entries_for(&self, parent_id: &RecordId) -> Result<Vec<StatusEntry>, StatusStoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| &entry.key().parent_id == parent_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
