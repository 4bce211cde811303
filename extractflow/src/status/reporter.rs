//! Status reporter used by strategies and step guards.

use std::sync::Arc;
use tracing::debug;

use super::{StatusKey, StatusView};
use crate::core::{ProcessingStatus, RecordId};
use crate::ports::{StatusStore, StatusStoreError};

/// Records and queries work item lifecycle status.
///
/// Cheap to clone; all clones share the same backing store.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn StatusStore>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}

impl StatusReporter {
    /// Creates a reporter over a status store.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Ensures an entry exists for the key, in the in-progress state.
    ///
    /// An existing entry is left untouched, so a redelivered work item keeps
    /// its last recorded status until a step writes a new one.
    pub async fn begin(&self, key: &StatusKey) -> Result<(), StatusStoreError> {
        debug!(key = %key, "Status begin");
        self.store.ensure(key, ProcessingStatus::InProgress).await
    }

    /// Overwrites the current status for the key.
    pub async fn mark_step(
        &self,
        key: &StatusKey,
        status: ProcessingStatus,
    ) -> Result<(), StatusStoreError> {
        debug!(key = %key, status = %status, "Status step");
        self.store.upsert(key, status, None).await
    }

    /// Records terminal success, with the produced record identity for child work.
    pub async fn mark_success(
        &self,
        key: &StatusKey,
        produced_id: Option<RecordId>,
        status: ProcessingStatus,
    ) -> Result<(), StatusStoreError> {
        debug!(
            key = %key,
            status = %status,
            produced_id = produced_id.as_ref().map(RecordId::as_str),
            "Status success"
        );
        self.store.upsert(key, status, produced_id).await
    }

    /// Returns the aggregated status of a parent and its children.
    pub async fn read(&self, parent_id: &RecordId) -> Result<StatusView, StatusStoreError> {
        let entries = self.store.entries_for(parent_id).await?;
        Ok(StatusView::from_entries(entries))
    }
}
