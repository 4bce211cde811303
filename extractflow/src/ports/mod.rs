//! Collaborator ports consumed by the pipeline.
//!
//! The object store, completion service, document store and status store are
//! external systems. The pipeline reaches them only through these traits, and
//! each reports failures through its own error enum so that strategies can
//! classify them into [`ExtractionError`](crate::errors::ExtractionError) kinds.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Document, ProcessingStatus, RecordId};
use crate::status::{StatusEntry, StatusKey};

#[cfg(test)]
use mockall::automock;

/// Errors reported by an object store.
#[derive(Debug, Clone, Error)]
pub enum ObjectStoreError {
    /// The object does not exist.
    #[error("Object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },

    /// The request timed out.
    #[error("Object store request timed out")]
    Timeout,

    /// The store could not be reached or returned a server error.
    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to raw input objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an object's full contents.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// A request to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// The prompt text.
    pub prompt: String,
    /// Model identifier.
    pub model: String,
    /// Optional file attached to the prompt.
    pub input: Option<Vec<u8>>,
}

impl CompletionRequest {
    /// Creates a prompt-only request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            input: None,
        }
    }

    /// Attaches a file to the request.
    #[must_use]
    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.input = Some(input);
        self
    }
}

/// Errors reported by the completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// The service answered without any text choices.
    #[error("Completion returned no text output")]
    EmptyResult,

    /// The service throttled the request.
    #[error("Completion rate limited: {0}")]
    RateLimited(String),

    /// The request timed out.
    #[error("Completion request timed out")]
    Timeout,

    /// A connection failure or server-side error.
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the request.
    #[error("Completion request rejected: {0}")]
    InvalidRequest(String),

    /// Any other failure.
    #[error("Completion failed: {0}")]
    Other(String),
}

impl CompletionError {
    /// Returns true for conditions that may clear up on redelivery.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout | Self::Unavailable(_)
        )
    }
}

/// The external completion/transform service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Runs one completion and returns the raw text output.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Errors reported by the document store.
#[derive(Debug, Clone, Error)]
pub enum DocumentStoreError {
    /// The request timed out.
    #[error("Document store request timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// A concurrent write conflicted with this one.
    #[error("Document store write conflict: {0}")]
    Conflict(String),
}

/// Persistence for structured records.
///
/// `insert` must be idempotent by identity: writing the same id twice leaves
/// one document.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes a document under the given identity.
    async fn insert(
        &self,
        collection: &str,
        id: &RecordId,
        document: Document,
    ) -> Result<(), DocumentStoreError>;

    /// Looks up a document by identity.
    async fn find_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Document>, DocumentStoreError>;
}

/// Errors reported by the status store.
#[derive(Debug, Clone, Error)]
pub enum StatusStoreError {
    /// The request timed out.
    #[error("Status store request timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("Status store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent lifecycle status records.
///
/// Writes are atomic per key. Keys for different children of the same parent
/// are independent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Creates the entry with `status` unless one already exists.
    async fn ensure(&self, key: &StatusKey, status: ProcessingStatus) -> Result<(), StatusStoreError>;

    /// Overwrites the entry's status, creating it if needed.
    async fn upsert(
        &self,
        key: &StatusKey,
        status: ProcessingStatus,
        produced_id: Option<RecordId>,
    ) -> Result<(), StatusStoreError>;

    /// Returns every entry recorded for a parent, including its children.
    async fn entries_for(&self, parent_id: &RecordId) -> Result<Vec<StatusEntry>, StatusStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_transience() {
        assert!(CompletionError::RateLimited("429".into()).is_transient());
        assert!(CompletionError::Timeout.is_transient());
        assert!(CompletionError::Unavailable("503".into()).is_transient());
        assert!(!CompletionError::EmptyResult.is_transient());
        assert!(!CompletionError::InvalidRequest("bad model".into()).is_transient());
        assert!(!CompletionError::Other("boom".into()).is_transient());
    }

    // Ports are used as trait objects throughout the pipeline.
    #[test]
    fn ports_are_object_safe() {
        fn _assert_object_store(_: &dyn ObjectStore) {}
        fn _assert_completion(_: &dyn CompletionService) {}
        fn _assert_documents(_: &dyn DocumentStore) {}
        fn _assert_status(_: &dyn StatusStore) {}
    }
}
