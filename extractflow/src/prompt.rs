//! Prompt template assembly.
//!
//! Templates use `{{NAME}}` placeholders. The universal sections are filled
//! once when a strategy is built; per-item placeholders such as `{{PAIRS}}`
//! are filled for every work item.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Placeholder replaced with the universal output requirements.
pub const OUTPUT_REQUIREMENTS_PLACEHOLDER: &str = "{{UNIVERSAL_OUTPUT_REQUIREMENTS}}";

/// Placeholder replaced with the universal text case rules.
pub const TEXT_CASE_RULES_PLACEHOLDER: &str = "{{UNIVERSAL_TEXT_CASE_RULES}}";

/// Placeholder replaced with a row's column/value pairs.
pub const PAIRS_PLACEHOLDER: &str = "{{PAIRS}}";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([A-Z0-9_]+)\}\}").expect("valid placeholder regex"))
}

/// A prompt with some or all placeholders filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Wraps raw template text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Builds a template with the universal sections filled in.
    #[must_use]
    pub fn with_universal_sections(
        text: &str,
        output_requirements: &str,
        text_case_rules: &str,
    ) -> Self {
        Self::new(
            text.replace(OUTPUT_REQUIREMENTS_PLACEHOLDER, output_requirements)
                .replace(TEXT_CASE_RULES_PLACEHOLDER, text_case_rules),
        )
    }

    /// Returns the template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns a copy of the text with one placeholder replaced.
    #[must_use]
    pub fn fill(&self, placeholder: &str, value: &str) -> String {
        self.text.replace(placeholder, value)
    }

    /// Fills `{{PAIRS}}` with a row's contents.
    ///
    /// Objects and arrays are rendered as compact JSON, strings verbatim.
    #[must_use]
    pub fn fill_pairs(&self, pairs: &Value) -> String {
        let rendered = match pairs {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.fill(PAIRS_PLACEHOLDER, &rendered)
    }

    /// Returns the names of placeholders still present, in order of appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        placeholder_pattern()
            .captures_iter(&self.text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}
