//! State and helpers shared by the strategy variants.

use serde_json::Value;
use tracing::{debug, warn};

use super::Collaborators;
use crate::config::PipelineConfig;
use crate::core::{Document, RecordId, StrategyKind, StructuredRecord, TransformOutput};
use crate::errors::{ExtractionError, RegistryError};
use crate::ports::{CompletionError, CompletionRequest};
use crate::prompt::PromptTemplate;

/// Field a completion uses to report that it could not extract anything.
pub const ERROR_FIELD: &str = "ERROR";

/// Classifies a completion service failure.
///
/// Rate limits, timeouts and unavailability are retryable. An empty result,
/// a rejected request and anything unrecognised are not.
#[must_use]
pub fn classify_completion_error(error: CompletionError) -> ExtractionError {
    if error.is_transient() {
        ExtractionError::retryable_from(error)
    } else {
        ExtractionError::non_retryable_from(error)
    }
}

/// Returns the body of a fenced code block, or the trimmed text if there is none.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.rfind("```") {
            return after_fence[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.rfind("```") {
            return after_fence[..end].trim();
        }
    }

    trimmed
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses completion text into record fields.
///
/// The text must hold a single JSON object. Fenced code blocks are only
/// unwrapped when the text does not parse as it is. Every failure is
/// non-retryable and keeps the raw text.
pub fn parse_output(raw: &str) -> Result<Document, ExtractionError> {
    let trimmed = raw.trim();
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(first) => {
            let body = strip_code_fence(trimmed);
            if body == trimmed {
                return Err(ExtractionError::non_retryable(format!("JSON decode error: {first}"))
                    .with_raw_output(raw));
            }
            serde_json::from_str(body).map_err(|e| {
                ExtractionError::non_retryable(format!("JSON decode error: {e}"))
                    .with_raw_output(raw)
            })?
        }
    };

    let Value::Object(fields) = value else {
        return Err(ExtractionError::non_retryable(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        ))
        .with_raw_output(raw));
    };

    if let Some(marker) = fields.get(ERROR_FIELD) {
        let detail = match marker {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(
            ExtractionError::non_retryable(format!("LLM error output: {detail}"))
                .with_raw_output(raw),
        );
    }

    Ok(fields)
}

/// Configuration resolved once per strategy instance.
#[derive(Debug, Clone)]
pub(crate) struct StrategyBase {
    pub(crate) kind: StrategyKind,
    pub(crate) prompt: PromptTemplate,
    pub(crate) model: String,
    pub(crate) collection: String,
    uploads_collection: String,
    file_name_field: String,
    pub(crate) collaborators: Collaborators,
}

impl StrategyBase {
    /// Resolves settings for `kind` and fills the universal prompt sections.
    pub(crate) fn from_config(
        kind: StrategyKind,
        config: &PipelineConfig,
        collaborators: &Collaborators,
    ) -> Result<Self, RegistryError> {
        let settings = config
            .settings(kind)
            .ok_or(RegistryError::MissingSettings(kind))?;
        let collection = config
            .destination_collection(kind)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RegistryError::InvalidSettings {
                kind,
                reason: "no destination collection".to_string(),
            })?;

        Ok(Self {
            kind,
            prompt: PromptTemplate::with_universal_sections(
                &settings.prompt,
                &config.universal_output_requirements,
                &config.universal_text_case_rules,
            ),
            model: settings.model.clone(),
            collection: collection.to_string(),
            uploads_collection: config.uploads_collection.clone(),
            file_name_field: config.upload_file_name_field.clone(),
            collaborators: collaborators.clone(),
        })
    }

    /// Sends a request and classifies the outcome.
    pub(crate) async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<TransformOutput, ExtractionError> {
        let text = self
            .collaborators
            .completion
            .complete(request)
            .await
            .map_err(classify_completion_error)?;

        if text.trim().is_empty() {
            return Err(ExtractionError::non_retryable_from(CompletionError::EmptyResult));
        }
        debug!(strategy = %self.kind, output_len = text.len(), "Completion received");
        Ok(TransformOutput::new(text))
    }

    /// Looks up the original file name of the upload a work item belongs to.
    ///
    /// A missing upload or field yields `null`; a store failure is retryable.
    async fn original_file_name(&self, parent_id: &RecordId) -> Result<Value, ExtractionError> {
        let upload = self
            .collaborators
            .documents
            .find_by_id(&self.uploads_collection, parent_id)
            .await
            .map_err(ExtractionError::retryable_from)?;

        match upload.and_then(|doc| doc.get(&self.file_name_field).cloned()) {
            Some(name) => Ok(name),
            None => {
                warn!(
                    parent_id = %parent_id,
                    collection = %self.uploads_collection,
                    "Upload has no original file name"
                );
                Ok(Value::Null)
            }
        }
    }

    /// Parses completion text and attaches identity and provenance.
    pub(crate) async fn shape(
        &self,
        output: &TransformOutput,
        parent_id: &RecordId,
        id: Option<RecordId>,
    ) -> Result<StructuredRecord, ExtractionError> {
        let fields = parse_output(output.as_str())?;
        let mut record = StructuredRecord::new(fields);
        record.set_field(
            StructuredRecord::FILE_NAME_FIELD,
            self.original_file_name(parent_id).await?,
        );
        Ok(match id {
            Some(id) => record.with_id(id),
            None => record,
        })
    }

    /// Writes a record under `id`.
    pub(crate) async fn write(
        &self,
        record: &StructuredRecord,
        id: RecordId,
    ) -> Result<RecordId, ExtractionError> {
        let document = record.clone().with_id(id.clone()).to_document();
        self.collaborators
            .documents
            .insert(&self.collection, &id, document)
            .await
            .map_err(ExtractionError::retryable_from)?;
        debug!(
            strategy = %self.kind,
            collection = %self.collection,
            id = %id,
            "Record written"
        );
        Ok(id)
    }
}
