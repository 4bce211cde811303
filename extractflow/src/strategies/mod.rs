//! Extraction strategies.
//!
//! A strategy runs the four ordered stages for one processing mode:
//!
//! 1. `prepare_input` acquires the raw input
//! 2. `invoke_transform` calls the completion service
//! 3. `shape_output` parses and validates the completion text
//! 4. `persist` writes the structured record
//!
//! Each stage reports failures as [`ExtractionError`]. The default
//! [`Strategy::process`] wraps every stage in a [`StepGuard`] using the
//! strategy's [`StepPlan`], then records success.

mod row;
mod shared;
mod whole_file;

pub use row::RowStrategy;
pub use shared::{classify_completion_error, parse_output, ERROR_FIELD};
pub use whole_file::WholeFileStrategy;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::core::{
    Granularity, PreparedInput, ProcessingStatus, RecordId, StrategyKind, StructuredRecord,
    TransformOutput, WorkItem,
};
use crate::errors::{ExtractionError, WorkItemError};
use crate::events::{completed_payload, EXTRACTION_COMPLETED};
use crate::pipeline::{ProcessContext, StepGuard, StepPolicy};
use crate::ports::{CompletionService, DocumentStore, ObjectStore};
use crate::status::StatusKey;

/// Status policies for the four stages of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    /// Input preparation.
    pub prepare: StepPolicy,
    /// Completion call.
    pub transform: StepPolicy,
    /// Output parsing and shaping.
    pub shape: StepPolicy,
    /// Record persistence.
    pub persist: StepPolicy,
}

impl StepPlan {
    /// Transform, shape and persist policies shared by every strategy.
    pub const TRANSFORM: StepPolicy = StepPolicy::new(
        "LLM extraction",
        ProcessingStatus::ExtractionRetryableError,
        ProcessingStatus::ExtractionNonRetryableError,
    );

    /// Shaping failures are always terminal in status terms.
    pub const SHAPE: StepPolicy =
        StepPolicy::uniform("JSON parsing", ProcessingStatus::ExtractionNonRetryableError);

    /// Persistence failures use their own status code.
    pub const PERSIST: StepPolicy =
        StepPolicy::uniform("JSON writing", ProcessingStatus::StructDataWritingError);

    /// Builds a plan with a strategy-specific preparation policy.
    #[must_use]
    pub const fn with_prepare(prepare: StepPolicy) -> Self {
        Self {
            prepare,
            transform: Self::TRANSFORM,
            shape: Self::SHAPE,
            persist: Self::PERSIST,
        }
    }

    /// Returns the policies in execution order.
    #[must_use]
    pub fn steps(&self) -> [StepPolicy; 4] {
        [self.prepare, self.transform, self.shape, self.persist]
    }
}

/// External systems a strategy talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Raw input storage.
    pub object_store: Arc<dyn ObjectStore>,
    /// Completion service.
    pub completion: Arc<dyn CompletionService>,
    /// Record and upload metadata storage.
    pub documents: Arc<dyn DocumentStore>,
}

impl Collaborators {
    /// Bundles the collaborators.
    #[must_use]
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        completion: Arc<dyn CompletionService>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            object_store,
            completion,
            documents,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Builds the status key a work item reports under.
pub fn status_key(item: &WorkItem, granularity: Granularity) -> Result<StatusKey, ExtractionError> {
    match granularity {
        Granularity::Parent => Ok(StatusKey::parent(item.parent_id.clone())),
        Granularity::Child => item
            .child_locator
            .clone()
            .map(|locator| StatusKey::child(item.parent_id.clone(), locator))
            .ok_or_else(|| {
                ExtractionError::non_retryable_from(WorkItemError::MissingField(
                    "child_locator".to_string(),
                ))
            }),
    }
}

/// Opens the guard flavor matching the strategy's granularity.
fn step_guard<'a>(
    ctx: &'a ProcessContext,
    key: &'a StatusKey,
    policy: StepPolicy,
    granularity: Granularity,
) -> StepGuard<'a> {
    match granularity {
        Granularity::Parent => StepGuard::parent(ctx, key, policy),
        Granularity::Child => StepGuard::child(ctx, key, policy),
    }
}

/// One processing mode of the extraction pipeline.
#[async_trait]
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Returns the strategy's registered kind.
    fn kind(&self) -> StrategyKind;

    /// Returns the granularity status and identity are tracked at.
    fn granularity(&self) -> Granularity;

    /// Returns the status policy for each stage.
    fn step_plan(&self) -> &StepPlan;

    /// Stage 1: acquires the raw input.
    async fn prepare_input(&self, item: &WorkItem) -> Result<PreparedInput, ExtractionError>;

    /// Stage 2: calls the completion service.
    async fn invoke_transform(
        &self,
        input: PreparedInput,
    ) -> Result<TransformOutput, ExtractionError>;

    /// Stage 3: parses the completion text into a record with identity and
    /// provenance attached.
    async fn shape_output(
        &self,
        output: TransformOutput,
        item: &WorkItem,
    ) -> Result<StructuredRecord, ExtractionError>;

    /// Stage 4: writes the record and returns its stored identity.
    async fn persist(
        &self,
        record: StructuredRecord,
        item: &WorkItem,
    ) -> Result<RecordId, ExtractionError>;

    /// Runs all four stages with status bookkeeping.
    ///
    /// Stops at the first failing stage; that stage's guard has already
    /// written the failure status when the error is returned. On success the
    /// terminal status is written once, carrying the produced identity for
    /// child work.
    async fn process(
        &self,
        item: &WorkItem,
        ctx: &ProcessContext,
    ) -> Result<RecordId, ExtractionError> {
        let key = status_key(item, self.granularity())?;
        ctx.reporter()
            .begin(&key)
            .await
            .map_err(ExtractionError::retryable_from)?;

        let plan = self.step_plan();
        let granularity = self.granularity();
        let prepared = step_guard(ctx, &key, plan.prepare, granularity)
            .run(self.prepare_input(item))
            .await?;
        let output = step_guard(ctx, &key, plan.transform, granularity)
            .run(self.invoke_transform(prepared))
            .await?;
        let record = step_guard(ctx, &key, plan.shape, granularity)
            .run(self.shape_output(output, item))
            .await?;
        let produced_id = step_guard(ctx, &key, plan.persist, granularity)
            .run(self.persist(record, item))
            .await?;

        let reported_id = match self.granularity() {
            Granularity::Child => Some(produced_id.clone()),
            Granularity::Parent => None,
        };
        ctx.reporter()
            .mark_success(&key, reported_id, ProcessingStatus::ExtractionEndedSuccessfully)
            .await
            .map_err(ExtractionError::retryable_from)?;

        ctx.events().try_emit(
            EXTRACTION_COMPLETED,
            Some(completed_payload(&key, self.kind(), &produced_id)),
        );
        info!(
            strategy = %self.kind(),
            key = %key,
            produced_id = %produced_id,
            "Extraction completed"
        );

        Ok(produced_id)
    }
}
