//! Processing status codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status recorded for a work item.
///
/// This is a closed set. `InProgress` is the initial state written when a
/// work item first enters the pipeline; the rest are written by step guards
/// and by the final success report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStatus {
    /// Work item entered the pipeline and has not failed yet.
    #[serde(rename = "extraction-in-progress")]
    InProgress,
    /// The raw input could not be acquired or prepared.
    ReadingInputError,
    /// The transform call failed transiently; the item will be redelivered.
    ExtractionRetryableError,
    /// The transform call or its output failed permanently.
    ExtractionNonRetryableError,
    /// The structured record could not be written.
    StructDataWritingError,
    /// All stages completed and the record was stored.
    ExtractionEndedSuccessfully,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::InProgress
    }
}

impl ProcessingStatus {
    /// All status codes, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::InProgress,
        Self::ReadingInputError,
        Self::ExtractionRetryableError,
        Self::ExtractionNonRetryableError,
        Self::StructDataWritingError,
        Self::ExtractionEndedSuccessfully,
    ];

    /// Returns the wire representation of the status code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "extraction-in-progress",
            Self::ReadingInputError => "reading-input-error",
            Self::ExtractionRetryableError => "extraction-retryable-error",
            Self::ExtractionNonRetryableError => "extraction-non-retryable-error",
            Self::StructDataWritingError => "struct-data-writing-error",
            Self::ExtractionEndedSuccessfully => "extraction-ended-successfully",
        }
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::ExtractionEndedSuccessfully)
    }

    /// Returns true if the status records a failure of any kind.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::InProgress | Self::ExtractionEndedSuccessfully)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown processing status '{s}'"))
    }
}
