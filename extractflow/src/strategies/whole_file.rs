//! Whole-file strategy: one uploaded file becomes one record.

use async_trait::async_trait;
use tracing::debug;

use super::shared::StrategyBase;
use super::{Collaborators, StepPlan, Strategy};
use crate::config::PipelineConfig;
use crate::core::{
    Granularity, PreparedInput, ProcessingStatus, RecordId, StrategyKind, StructuredRecord,
    TransformOutput, WorkItem,
};
use crate::errors::{ExtractionError, RegistryError};
use crate::pipeline::StepPolicy;
use crate::ports::{CompletionRequest, ObjectStoreError};

/// Payload field holding the object key of the upload.
pub const KEY_FIELD: &str = "key";

const PLAN: StepPlan =
    StepPlan::with_prepare(StepPolicy::uniform("S3 reading", ProcessingStatus::ReadingInputError));

/// Sends a whole file to the completion service and stores one record under
/// the parent's identity.
#[derive(Debug, Clone)]
pub struct WholeFileStrategy {
    base: StrategyBase,
    bucket: String,
}

impl WholeFileStrategy {
    /// Creates the strategy from configuration.
    pub fn new(config: &PipelineConfig, collaborators: &Collaborators) -> Result<Self, RegistryError> {
        let kind = StrategyKind::OneFileOneObject;
        if config.bucket_name.is_empty() {
            return Err(RegistryError::InvalidSettings {
                kind,
                reason: "bucket_name is not set".to_string(),
            });
        }
        Ok(Self {
            base: StrategyBase::from_config(kind, config, collaborators)?,
            bucket: config.bucket_name.clone(),
        })
    }

    /// Returns the bucket inputs are read from.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Every object store failure is retryable. A missing object may still be
/// in flight from the uploader when the message arrives.
fn classify_read_error(error: ObjectStoreError) -> ExtractionError {
    match error {
        ObjectStoreError::NotFound { .. }
        | ObjectStoreError::Timeout
        | ObjectStoreError::Unavailable(_) => ExtractionError::retryable_from(error),
    }
}

#[async_trait]
impl Strategy for WholeFileStrategy {
    fn kind(&self) -> StrategyKind {
        self.base.kind
    }

    fn granularity(&self) -> Granularity {
        Granularity::Parent
    }

    fn step_plan(&self) -> &StepPlan {
        &PLAN
    }

    async fn prepare_input(&self, item: &WorkItem) -> Result<PreparedInput, ExtractionError> {
        let key = item
            .require_str(KEY_FIELD)
            .map_err(ExtractionError::non_retryable_from)?;
        let bytes = self
            .base
            .collaborators
            .object_store
            .get(&self.bucket, key)
            .await
            .map_err(classify_read_error)?;
        debug!(bucket = %self.bucket, key, size = bytes.len(), "Input read");
        Ok(PreparedInput::Bytes(bytes))
    }

    async fn invoke_transform(
        &self,
        input: PreparedInput,
    ) -> Result<TransformOutput, ExtractionError> {
        let request = CompletionRequest::new(self.base.prompt.as_str(), &self.base.model);
        let request = match input {
            PreparedInput::Bytes(bytes) => request.with_input(bytes),
            PreparedInput::Prompt(_) => {
                return Err(ExtractionError::non_retryable(
                    "whole-file transform expects file bytes",
                ))
            }
        };
        self.base.complete(request).await
    }

    async fn shape_output(
        &self,
        output: TransformOutput,
        item: &WorkItem,
    ) -> Result<StructuredRecord, ExtractionError> {
        self.base
            .shape(&output, &item.parent_id, Some(item.parent_id.clone()))
            .await
    }

    async fn persist(
        &self,
        record: StructuredRecord,
        item: &WorkItem,
    ) -> Result<RecordId, ExtractionError> {
        let id = record.id().cloned().unwrap_or_else(|| item.parent_id.clone());
        self.base.write(&record, id).await
    }
}
