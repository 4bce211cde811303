//! Status keys, entries and the aggregated per-parent view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::{ChildLocator, ProcessingStatus, RecordId};

/// Identifies one status entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    /// The owning document.
    pub parent_id: RecordId,
    /// The child within the document, for child-granularity work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildLocator>,
}

impl StatusKey {
    /// Creates a parent-level key.
    #[must_use]
    pub fn parent(parent_id: RecordId) -> Self {
        Self {
            parent_id,
            child: None,
        }
    }

    /// Creates a child-level key.
    #[must_use]
    pub fn child(parent_id: RecordId, locator: ChildLocator) -> Self {
        Self {
            parent_id,
            child: Some(locator),
        }
    }

    /// Returns true if this key addresses a child entry.
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.child.is_some()
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.child {
            Some(child) => write!(f, "{}#{}", self.parent_id, child),
            None => write!(f, "{}", self.parent_id),
        }
    }
}

/// The recorded lifecycle state for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The entry's key.
    pub key: StatusKey,
    /// Current status code.
    pub status: ProcessingStatus,
    /// Identity of the stored record, once one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_id: Option<RecordId>,
    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
}

impl StatusEntry {
    /// Creates a new entry stamped with the current time.
    #[must_use]
    pub fn new(key: StatusKey, status: ProcessingStatus) -> Self {
        Self {
            key,
            status,
            produced_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Aggregated status for a parent and all of its children.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusView {
    /// The parent-level entry, if the parent itself was processed.
    pub parent: Option<StatusEntry>,
    /// Child entries ordered by locator.
    pub children: Vec<StatusEntry>,
}

impl StatusView {
    /// Builds a view from the raw entries of one parent.
    #[must_use]
    pub fn from_entries(entries: Vec<StatusEntry>) -> Self {
        let mut view = Self::default();
        for entry in entries {
            if entry.key.is_child() {
                view.children.push(entry);
            } else {
                view.parent = Some(entry);
            }
        }
        view.children.sort_by(|a, b| a.key.child.cmp(&b.key.child));
        view
    }

    /// Returns the entry for one child.
    #[must_use]
    pub fn child(&self, locator: &ChildLocator) -> Option<&StatusEntry> {
        self.children
            .iter()
            .find(|entry| entry.key.child.as_ref() == Some(locator))
    }

    /// Counts children per status code.
    #[must_use]
    pub fn summary(&self) -> HashMap<ProcessingStatus, usize> {
        let mut counts = HashMap::new();
        for entry in &self.children {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    /// Returns true when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.children.is_empty()
    }
}
