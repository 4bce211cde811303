//! Test fixtures for pipeline testing.

use serde_json::{json, Value};
use std::sync::Arc;

use super::{InMemoryDocumentStore, InMemoryObjectStore, ScriptedCompletionService};
use crate::config::{PipelineConfig, StrategySettings};
use crate::core::{ChildLocator, Document, StrategyKind, WorkItem};
use crate::events::CollectingEventSink;
use crate::pipeline::{PipelineDriver, ProcessContext, StrategyRegistry};
use crate::status::{InMemoryStatusStore, StatusReporter};
use crate::strategies::Collaborators;

/// Bucket used by [`sample_config`].
pub const SAMPLE_BUCKET: &str = "raw-uploads";

/// Destination collection of the whole-file strategy in [`sample_config`].
pub const WHOLE_FILE_COLLECTION: &str = "contracts";

/// Destination collection of the row strategy in [`sample_config`].
pub const ROW_COLLECTION: &str = "rates";

/// A valid configuration with both built-in strategies.
#[must_use]
pub fn sample_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_bucket(SAMPLE_BUCKET)
        .with_universal_sections("Return only JSON.", "Keep the original casing.")
        .with_strategy(
            StrategyKind::OneFileOneObject,
            StrategySettings::new(
                "Extract the contract parties.\n{{UNIVERSAL_OUTPUT_REQUIREMENTS}}\n{{UNIVERSAL_TEXT_CASE_RULES}}",
                "gpt-4o",
                WHOLE_FILE_COLLECTION,
            ),
        )
        .with_strategy(
            StrategyKind::OneRowOneObject,
            StrategySettings::new(
                "Extract the rate.\n{{UNIVERSAL_OUTPUT_REQUIREMENTS}}\n{{UNIVERSAL_TEXT_CASE_RULES}}\nRow: {{PAIRS}}",
                "gpt-4o-mini",
                ROW_COLLECTION,
            ),
        )
}

/// A whole-file work item pointing at `key`.
#[must_use]
pub fn whole_file_item(parent_id: &str, key: &str) -> WorkItem {
    WorkItem::parent(StrategyKind::OneFileOneObject, parent_id).with_field("key", json!(key))
}

/// A row work item carrying `item` as its column/value pairs.
#[must_use]
pub fn row_item(parent_id: &str, sheet: &str, row: u64, item: Value) -> WorkItem {
    WorkItem::child(
        StrategyKind::OneRowOneObject,
        parent_id,
        ChildLocator::new(sheet, row),
    )
    .with_field("item", item)
}

/// In-memory collaborators wired to a driver.
#[derive(Debug)]
pub struct TestHarness {
    /// Raw input storage.
    pub objects: Arc<InMemoryObjectStore>,
    /// Completion service.
    pub completion: Arc<ScriptedCompletionService>,
    /// Record and upload storage.
    pub documents: Arc<InMemoryDocumentStore>,
    /// Status storage.
    pub statuses: Arc<InMemoryStatusStore>,
    /// Collected notifications.
    pub events: Arc<CollectingEventSink>,
    config: PipelineConfig,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness using [`sample_config`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(sample_config())
    }

    /// Creates a harness with a custom configuration.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            objects: Arc::new(InMemoryObjectStore::new()),
            completion: Arc::new(ScriptedCompletionService::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
            statuses: Arc::new(InMemoryStatusStore::new()),
            events: Arc::new(CollectingEventSink::new()),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the collaborators as trait objects.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.objects.clone(),
            self.completion.clone(),
            self.documents.clone(),
        )
    }

    /// Returns a context backed by the harness status store and event sink.
    #[must_use]
    pub fn context(&self) -> ProcessContext {
        ProcessContext::new(StatusReporter::new(self.statuses.clone()))
            .with_events(self.events.clone())
    }

    /// Builds a driver over the default registry.
    #[must_use]
    pub fn driver(&self) -> PipelineDriver {
        PipelineDriver::new(
            StrategyRegistry::with_defaults(),
            self.config.clone(),
            self.collaborators(),
            self.context(),
        )
    }

    /// Stores an upload's raw bytes and its metadata document.
    pub fn seed_upload(&self, parent_id: &str, key: &str, file_name: &str, bytes: &[u8]) {
        self.objects.put(self.config.bucket_name.clone(), key, bytes.to_vec());
        let mut upload = Document::new();
        upload.insert(
            self.config.upload_file_name_field.clone(),
            Value::String(file_name.to_string()),
        );
        self.documents
            .seed(self.config.uploads_collection.clone(), parent_id, upload);
    }
}
