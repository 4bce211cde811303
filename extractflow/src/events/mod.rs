//! Pipeline lifecycle notifications.
//!
//! Step guards and the driver publish notifications through an [`EventSink`]
//! so operators can follow failures without reading the status store.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde_json::{json, Value};

use crate::core::{ProcessingStatus, RecordId, StrategyKind};
use crate::errors::ExtractionError;
use crate::status::StatusKey;

/// Event emitted when a guarded step fails.
pub const STEP_FAILED: &str = "step.failed";

/// Event emitted when a work item finishes all stages.
pub const EXTRACTION_COMPLETED: &str = "extraction.completed";

/// Builds the payload for a [`STEP_FAILED`] event.
#[must_use]
pub fn step_failed_payload(
    key: &StatusKey,
    step: &str,
    status: ProcessingStatus,
    error: &ExtractionError,
) -> Value {
    json!({
        "key": key.to_string(),
        "step": step,
        "status": status.as_str(),
        "retryable": error.is_retryable(),
        "error": error.message(),
    })
}

/// Builds the payload for an [`EXTRACTION_COMPLETED`] event.
#[must_use]
pub fn completed_payload(key: &StatusKey, kind: StrategyKind, produced_id: &RecordId) -> Value {
    json!({
        "key": key.to_string(),
        "strategy": kind.as_str(),
        "produced_id": produced_id.as_str(),
    })
}
