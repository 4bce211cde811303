//! Error types for the extraction pipeline.
//!
//! Stage failures are classified into exactly two kinds, [`ExtractionError::Retryable`]
//! and [`ExtractionError::NonRetryable`]. Everything a stage touches (object store,
//! completion service, document store) reports its own error enum, and the stage
//! converts it into one of these two kinds before returning.
//!
//! Errors that happen before a strategy runs (unknown strategy, malformed message,
//! bad configuration) live outside the stage taxonomy and are wrapped by
//! [`PipelineError`] at the driver boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::StrategyKind;

/// Boxed underlying cause carried by an [`ExtractionError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The two-way failure classification every pipeline stage reports.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A transient condition. The transport should redeliver the message.
    #[error("Retryable error: {message}")]
    Retryable {
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        cause: Option<BoxError>,
    },

    /// A structural or semantic problem that retrying will not fix.
    #[error("Non-retryable error: {message}")]
    NonRetryable {
        /// Human-readable description.
        message: String,
        /// Raw transform output kept for diagnostics.
        raw_output: Option<String>,
        /// Underlying cause, if any.
        #[source]
        cause: Option<BoxError>,
    },
}

impl ExtractionError {
    /// Creates a retryable error with a message.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a retryable error wrapping a cause.
    #[must_use]
    pub fn retryable_from<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Retryable {
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates a retryable error with a message and an underlying cause.
    #[must_use]
    pub fn retryable_with<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Retryable {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates a non-retryable error with a message.
    #[must_use]
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable {
            message: message.into(),
            raw_output: None,
            cause: None,
        }
    }

    /// Creates a non-retryable error wrapping a cause.
    #[must_use]
    pub fn non_retryable_from<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::NonRetryable {
            message: cause.to_string(),
            raw_output: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Attaches the raw transform output to a non-retryable error.
    ///
    /// Retryable errors are returned unchanged.
    #[must_use]
    pub fn with_raw_output(self, raw: impl Into<String>) -> Self {
        match self {
            Self::NonRetryable { message, cause, .. } => Self::NonRetryable {
                message,
                raw_output: Some(raw.into()),
                cause,
            },
            other => other,
        }
    }

    /// Returns true if the transport should redeliver the work item.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    /// Returns the error message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message, .. } | Self::NonRetryable { message, .. } => message,
        }
    }

    /// Returns the raw transform output retained for diagnostics.
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::NonRetryable { raw_output, .. } => raw_output.as_deref(),
            Self::Retryable { .. } => None,
        }
    }

    /// Returns the transport disposition for this error.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        if self.is_retryable() {
            Disposition::Redeliver
        } else {
            Disposition::Acknowledge
        }
    }
}

/// What the message transport should do with a message after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Delete the message; its outcome is final.
    Acknowledge,
    /// Leave the message for redelivery.
    Redeliver,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledge => write!(f, "acknowledge"),
            Self::Redeliver => write!(f, "redeliver"),
        }
    }
}

/// Errors resolving or constructing a strategy.
///
/// These indicate a deployment mismatch and are never retryable.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No constructor is registered for the strategy kind.
    #[error("No strategy registered for kind '{0}'")]
    UnknownStrategy(StrategyKind),

    /// The configuration has no settings for the strategy kind.
    #[error("No settings configured for strategy '{0}'")]
    MissingSettings(StrategyKind),

    /// The strategy settings are present but unusable.
    #[error("Invalid settings for strategy '{kind}': {reason}")]
    InvalidSettings {
        /// The strategy kind.
        kind: StrategyKind,
        /// Why the settings were rejected.
        reason: String,
    },
}

/// Errors parsing or validating an incoming work item.
#[derive(Debug, Clone, Error)]
pub enum WorkItemError {
    /// A required field is missing from the message body.
    #[error("Work item is missing required field '{0}'")]
    MissingField(String),

    /// A field is present but has the wrong shape.
    #[error("Work item field '{field}' is invalid: {reason}")]
    InvalidField {
        /// The field name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The child locator does not match the strategy's granularity.
    #[error("Strategy '{kind}' {expectation}")]
    GranularityMismatch {
        /// The resolved strategy kind.
        kind: StrategyKind,
        /// Description of the expected locator presence.
        expectation: &'static str,
    },
}

impl WorkItemError {
    /// Creates an invalid field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration: {message}")]
pub struct ConfigError {
    /// The error message.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the pipeline driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed; the kind decides redelivery.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Strategy resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The work item was malformed.
    #[error(transparent)]
    WorkItem(#[from] WorkItemError),
}

impl PipelineError {
    /// Returns the transport disposition for this error.
    ///
    /// Only retryable stage failures are redelivered. Registry and work item
    /// errors will fail identically on every delivery.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Extraction(err) => err.disposition(),
            Self::Registry(_) | Self::WorkItem(_) => Disposition::Acknowledge,
        }
    }

    /// Returns true for configuration errors that point to a deployment mismatch.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns the stage error, if this is one.
    #[must_use]
    pub fn as_extraction(&self) -> Option<&ExtractionError> {
        match self {
            Self::Extraction(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("socket closed")]
    struct SocketClosed;

    #[test]
    fn test_retryable_from_keeps_cause() {
        let err = ExtractionError::retryable_from(SocketClosed);
        assert!(err.is_retryable());
        assert_eq!(err.message(), "socket closed");
        assert!(err.source().is_some());
        assert_eq!(err.disposition(), Disposition::Redeliver);
    }

    #[test]
    fn test_non_retryable_with_raw_output() {
        let err = ExtractionError::non_retryable("bad json").with_raw_output("{not json");
        assert!(!err.is_retryable());
        assert_eq!(err.raw_output(), Some("{not json"));
        assert_eq!(err.disposition(), Disposition::Acknowledge);
        assert_eq!(err.to_string(), "Non-retryable error: bad json");
    }

    #[test]
    fn test_raw_output_ignored_for_retryable() {
        let err = ExtractionError::retryable("timeout").with_raw_output("partial");
        assert!(err.is_retryable());
        assert!(err.raw_output().is_none());
    }

    #[test]
    fn test_pipeline_error_disposition() {
        let err = PipelineError::from(RegistryError::UnknownStrategy(StrategyKind::OneRowOneObject));
        assert!(err.is_fatal());
        assert_eq!(err.disposition(), Disposition::Acknowledge);

        let err = PipelineError::from(ExtractionError::retryable("throttled"));
        assert!(!err.is_fatal());
        assert_eq!(err.disposition(), Disposition::Redeliver);
        assert!(err.as_extraction().is_some());
    }

    #[test]
    fn test_work_item_error_display() {
        let err = WorkItemError::MissingField("parent_id".to_string());
        assert!(err.to_string().contains("parent_id"));

        let err = WorkItemError::GranularityMismatch {
            kind: StrategyKind::OneFileOneObject,
            expectation: "must not carry a child locator",
        };
        assert_eq!(
            err.to_string(),
            "Strategy 'one_file_one_object' must not carry a child locator"
        );
    }
}
