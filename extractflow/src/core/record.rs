//! Record identities and the values passed between pipeline stages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::ChildLocator;

/// Namespace for identities minted for child records.
const CHILD_RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x5d1c_7a3e_9b42_4f0e_8c61_2f7d_e4a9_b318);

/// A JSON document as written to the document store.
pub type Document = Map<String, Value>;

/// Identity of a parent document or a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints the identity for the record produced from one child of a parent.
    ///
    /// The identity is distinct from the parent's and stable for a given
    /// `(parent, locator)` pair, so a redelivered row overwrites its earlier
    /// record instead of adding a second one. Each variable-length part of
    /// the hashed name carries its byte length, so no two pairs share a name.
    #[must_use]
    pub fn for_child(parent: &Self, locator: &ChildLocator) -> Self {
        let name = format!(
            "{}:{}|{}:{}|{}",
            parent.0.len(),
            parent.0,
            locator.sheet.len(),
            locator.sheet,
            locator.row
        );
        Self(Uuid::new_v5(&CHILD_RECORD_NAMESPACE, name.as_bytes()).to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Output of the input preparation stage.
#[derive(Clone, PartialEq, Eq)]
pub enum PreparedInput {
    /// Raw file bytes to attach to the completion request.
    Bytes(Vec<u8>),
    /// A fully substituted prompt.
    Prompt(String),
}

impl PreparedInput {
    /// Returns the size of the prepared input in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Prompt(prompt) => prompt.len(),
        }
    }

    /// Returns true if the prepared input is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PreparedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Prompt(prompt) => f.debug_tuple("Prompt").field(&prompt.len()).finish(),
        }
    }
}

/// Raw text returned by the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput(String);

impl TransformOutput {
    /// Wraps raw completion text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the output and returns the raw text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A shaped record ready to be written to the document store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredRecord {
    id: Option<RecordId>,
    fields: Document,
}

impl StructuredRecord {
    /// Identity field name in stored documents.
    pub const ID_FIELD: &'static str = "_id";

    /// Provenance field naming the originating upload.
    pub const FILE_NAME_FIELD: &'static str = "file_name_original";

    /// Creates a record from parsed fields, without an identity yet.
    #[must_use]
    pub fn new(fields: Document) -> Self {
        Self { id: None, fields }
    }

    /// Sets the record identity.
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the record identity if one was assigned.
    #[must_use]
    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// Sets a field, replacing any previous value.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the shaped fields.
    #[must_use]
    pub fn fields(&self) -> &Document {
        &self.fields
    }

    /// Builds the stored document, with `_id` set from the identity.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = self.fields.clone();
        if let Some(id) = &self.id {
            document.insert(Self::ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        document
    }
}
