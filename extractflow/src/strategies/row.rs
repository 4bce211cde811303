//! Row strategy: each spreadsheet row becomes its own record.

use async_trait::async_trait;

use super::shared::StrategyBase;
use super::{Collaborators, StepPlan, Strategy};
use crate::config::PipelineConfig;
use crate::core::{
    Granularity, PreparedInput, ProcessingStatus, RecordId, StrategyKind, StructuredRecord,
    TransformOutput, WorkItem,
};
use crate::errors::{ExtractionError, RegistryError, WorkItemError};
use crate::pipeline::StepPolicy;
use crate::ports::CompletionRequest;
use crate::prompt::PAIRS_PLACEHOLDER;

/// Payload field holding the row's column/value pairs.
pub const ITEM_FIELD: &str = "item";

const PLAN: StepPlan = StepPlan::with_prepare(StepPolicy::uniform(
    "prompt preparation",
    ProcessingStatus::ExtractionNonRetryableError,
));

/// Extracts one record per row of a parent upload.
///
/// Status is tracked per row. The stored record gets an identity derived
/// from the parent and the row locator.
#[derive(Debug, Clone)]
pub struct RowStrategy {
    base: StrategyBase,
}

impl RowStrategy {
    /// Creates the strategy from configuration.
    pub fn new(config: &PipelineConfig, collaborators: &Collaborators) -> Result<Self, RegistryError> {
        let kind = StrategyKind::OneRowOneObject;
        let base = StrategyBase::from_config(kind, config, collaborators)?;
        if !base.prompt.as_str().contains(PAIRS_PLACEHOLDER) {
            return Err(RegistryError::InvalidSettings {
                kind,
                reason: format!("prompt has no {PAIRS_PLACEHOLDER} placeholder"),
            });
        }
        Ok(Self { base })
    }
}

fn child_id(item: &WorkItem) -> Result<RecordId, ExtractionError> {
    item.child_locator
        .as_ref()
        .map(|locator| RecordId::for_child(&item.parent_id, locator))
        .ok_or_else(|| {
            ExtractionError::non_retryable_from(WorkItemError::MissingField(
                "child_locator".to_string(),
            ))
        })
}

#[async_trait]
impl Strategy for RowStrategy {
    fn kind(&self) -> StrategyKind {
        self.base.kind
    }

    fn granularity(&self) -> Granularity {
        Granularity::Child
    }

    fn step_plan(&self) -> &StepPlan {
        &PLAN
    }

    async fn prepare_input(&self, item: &WorkItem) -> Result<PreparedInput, ExtractionError> {
        let pairs = item.field(ITEM_FIELD).ok_or_else(|| {
            ExtractionError::non_retryable_from(WorkItemError::MissingField(ITEM_FIELD.to_string()))
        })?;
        Ok(PreparedInput::Prompt(self.base.prompt.fill_pairs(pairs)))
    }

    async fn invoke_transform(
        &self,
        input: PreparedInput,
    ) -> Result<TransformOutput, ExtractionError> {
        let PreparedInput::Prompt(prompt) = input else {
            return Err(ExtractionError::non_retryable(
                "row transform expects a filled prompt",
            ));
        };
        self.base
            .complete(CompletionRequest::new(prompt, &self.base.model))
            .await
    }

    async fn shape_output(
        &self,
        output: TransformOutput,
        item: &WorkItem,
    ) -> Result<StructuredRecord, ExtractionError> {
        self.base.shape(&output, &item.parent_id, None).await
    }

    async fn persist(
        &self,
        record: StructuredRecord,
        item: &WorkItem,
    ) -> Result<RecordId, ExtractionError> {
        let id = child_id(item)?;
        self.base.write(&record, id).await
    }
}
