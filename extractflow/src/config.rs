//! Pipeline configuration.
//!
//! Configuration is plain serde data with defaults for every optional field.
//! It can be built in code with the `with_*` setters, or loaded from JSON and
//! then adjusted from environment variables.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::StrategyKind;
use crate::errors::ConfigError;
use crate::observability::LogFormat;
use crate::prompt::PAIRS_PLACEHOLDER;

/// Environment variable overriding [`PipelineConfig::bucket_name`].
pub const BUCKET_NAME_ENV: &str = "BUCKET_NAME";

/// Environment variable overriding [`PipelineConfig::temp_extraction_collection`].
pub const TEMP_COLLECTION_ENV: &str = "EXTRACTION_TEMP_COLLECTION";

/// Per-strategy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Prompt template; may contain the universal placeholders.
    pub prompt: String,
    /// Completion model identifier.
    pub model: String,
    /// Collection that receives the strategy's records.
    pub documents_collection: String,
}

impl StrategySettings {
    /// Creates strategy settings.
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        documents_collection: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            documents_collection: documents_collection.into(),
        }
    }
}

/// Configuration shared by every strategy in a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bucket holding raw uploads.
    #[serde(default)]
    pub bucket_name: String,
    /// Collection holding upload metadata.
    #[serde(default = "default_uploads_collection")]
    pub uploads_collection: String,
    /// Field of an upload document holding its original file name.
    #[serde(default = "default_file_name_field")]
    pub upload_file_name_field: String,
    /// When set, every strategy writes here instead of its own collection.
    #[serde(default)]
    pub temp_extraction_collection: Option<String>,
    /// Text substituted for the universal output requirements placeholder.
    #[serde(default)]
    pub universal_output_requirements: String,
    /// Text substituted for the universal text case rules placeholder.
    #[serde(default)]
    pub universal_text_case_rules: String,
    /// Maximum number of work items processed at once by a worker pool.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Settings per registered strategy.
    #[serde(default)]
    pub strategies: HashMap<StrategyKind, StrategySettings>,
}

fn default_uploads_collection() -> String {
    "uploads".to_string()
}

fn default_file_name_field() -> String {
    "file_name".to_string()
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            uploads_collection: default_uploads_collection(),
            upload_file_name_field: default_file_name_field(),
            temp_extraction_collection: None,
            universal_output_requirements: String::new(),
            universal_text_case_rules: String::new(),
            max_concurrency: default_max_concurrency(),
            log_format: LogFormat::default(),
            strategies: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upload bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket_name = bucket.into();
        self
    }

    /// Sets the override collection for all strategies.
    #[must_use]
    pub fn with_temp_extraction_collection(mut self, collection: impl Into<String>) -> Self {
        self.temp_extraction_collection = Some(collection.into());
        self
    }

    /// Sets the universal prompt sections.
    #[must_use]
    pub fn with_universal_sections(
        mut self,
        output_requirements: impl Into<String>,
        text_case_rules: impl Into<String>,
    ) -> Self {
        self.universal_output_requirements = output_requirements.into();
        self.universal_text_case_rules = text_case_rules.into();
        self
    }

    /// Sets the worker pool concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Sets the log output format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Installs the global tracing subscriber in the configured format.
    ///
    /// Fails if a subscriber is already installed.
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        crate::observability::init_tracing(self.log_format)
    }

    /// Adds settings for a strategy.
    #[must_use]
    pub fn with_strategy(mut self, kind: StrategyKind, settings: StrategySettings) -> Self {
        self.strategies.insert(kind, settings);
        self
    }

    /// Returns the settings for a strategy.
    #[must_use]
    pub fn settings(&self, kind: StrategyKind) -> Option<&StrategySettings> {
        self.strategies.get(&kind)
    }

    /// Returns the collection a strategy writes its records to.
    #[must_use]
    pub fn destination_collection(&self, kind: StrategyKind) -> Option<&str> {
        match self.temp_extraction_collection.as_deref() {
            Some(collection) if !collection.is_empty() => Some(collection),
            _ => self.settings(kind).map(|s| s.documents_collection.as_str()),
        }
    }

    /// Parses configuration from a JSON string.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse pipeline configuration")
    }

    /// Loads configuration from a JSON file, applies environment overrides
    /// and validates the result.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let config = Self::from_json_str(&raw)?.with_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup such as the process environment.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup(BUCKET_NAME_ENV) {
            self.bucket_name = bucket;
        }
        if let Some(collection) = lookup(TEMP_COLLECTION_ENV) {
            self.temp_extraction_collection = Some(collection).filter(|c| !c.is_empty());
        }
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::new("max_concurrency must be >= 1"));
        }
        if self.uploads_collection.is_empty() {
            return Err(ConfigError::new("uploads_collection must not be empty"));
        }

        for (kind, settings) in &self.strategies {
            if settings.model.trim().is_empty() {
                return Err(ConfigError::new(format!("strategy '{kind}' has no model")));
            }
            if settings.prompt.trim().is_empty() {
                return Err(ConfigError::new(format!("strategy '{kind}' has no prompt")));
            }
            if settings.documents_collection.is_empty() && self.temp_extraction_collection.is_none() {
                return Err(ConfigError::new(format!(
                    "strategy '{kind}' has no documents_collection"
                )));
            }
            match kind {
                StrategyKind::OneFileOneObject if self.bucket_name.is_empty() => {
                    return Err(ConfigError::new(format!(
                        "strategy '{kind}' needs bucket_name"
                    )));
                }
                StrategyKind::OneRowOneObject if !settings.prompt.contains(PAIRS_PLACEHOLDER) => {
                    return Err(ConfigError::new(format!(
                        "strategy '{kind}' prompt must contain {PAIRS_PLACEHOLDER}"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
