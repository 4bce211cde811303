//! In-memory collaborators for testing.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::{Document, RecordId};
use crate::ports::{
    CompletionError, CompletionRequest, CompletionService, DocumentStore, DocumentStoreError,
    ObjectStore, ObjectStoreError,
};

/// An object store backed by a map, with queued failures.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
    failures: Mutex<VecDeque<ObjectStoreError>>,
    failing_keys: DashMap<String, ObjectStoreError>,
    reads: Mutex<usize>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object.
    pub fn put(&self, bucket: impl Into<String>, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.insert((bucket.into(), key.into()), bytes.into());
    }

    /// Makes the next read fail with `error`.
    pub fn fail_next(&self, error: ObjectStoreError) {
        self.failures.lock().push_back(error);
    }

    /// Makes every read of `key` fail with `error`.
    pub fn fail_key(&self, key: impl Into<String>, error: ObjectStoreError) {
        self.failing_keys.insert(key.into(), error);
    }

    /// Returns the number of reads attempted.
    #[must_use]
    pub fn read_count(&self) -> usize {
        *self.reads.lock()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        *self.reads.lock() += 1;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing_keys.get(key) {
            return Err(error.value().clone());
        }
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// A completion service that replays scripted responses in order.
///
/// Once the script is exhausted the fallback response is returned; with no
/// fallback the service reports an empty result.
#[derive(Debug, Default)]
pub struct ScriptedCompletionService {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    fallback: Mutex<Option<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionService {
    /// Creates a service with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that always answers `text`.
    #[must_use]
    pub fn always(text: impl Into<String>) -> Self {
        let service = Self::new();
        service.set_fallback(text);
        service
    }

    /// Queues a successful response.
    pub fn push_ok(&self, text: impl Into<String>) {
        self.script.lock().push_back(Ok(text.into()));
    }

    /// Queues a failure.
    pub fn push_err(&self, error: CompletionError) {
        self.script.lock().push_back(Err(error));
    }

    /// Sets the response used once the script runs out.
    pub fn set_fallback(&self, text: impl Into<String>) {
        *self.fallback.lock() = Some(text.into());
    }

    /// Returns every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().push(request);
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        self.fallback
            .lock()
            .clone()
            .ok_or(CompletionError::EmptyResult)
    }
}

/// A document store keyed by `(collection, id)`.
///
/// Inserting an existing id replaces the document.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<(String, RecordId), Document>,
    insert_failures: Mutex<VecDeque<DocumentStoreError>>,
    lookup_failures: Mutex<VecDeque<DocumentStoreError>>,
    inserts: Mutex<usize>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without counting it as an insert.
    pub fn seed(&self, collection: impl Into<String>, id: impl Into<RecordId>, document: Document) {
        self.documents.insert((collection.into(), id.into()), document);
    }

    /// Makes the next insert fail with `error`.
    pub fn fail_next_insert(&self, error: DocumentStoreError) {
        self.insert_failures.lock().push_back(error);
    }

    /// Makes the next lookup fail with `error`.
    pub fn fail_next_lookup(&self, error: DocumentStoreError) {
        self.lookup_failures.lock().push_back(error);
    }

    /// Returns a stored document.
    #[must_use]
    pub fn get(&self, collection: &str, id: &RecordId) -> Option<Document> {
        self.documents
            .get(&(collection.to_string(), id.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Returns the number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    /// Returns the number of successful inserts.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        *self.inserts.lock()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(
        &self,
        collection: &str,
        id: &RecordId,
        document: Document,
    ) -> Result<(), DocumentStoreError> {
        if let Some(error) = self.insert_failures.lock().pop_front() {
            return Err(error);
        }
        self.documents
            .insert((collection.to_string(), id.clone()), document);
        *self.inserts.lock() += 1;
        Ok(())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Document>, DocumentStoreError> {
        if let Some(error) = self.lookup_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.get(collection, id))
    }
}
