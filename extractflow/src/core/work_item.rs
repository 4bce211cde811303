//! Work items and the identifiers that route them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::RecordId;
use crate::errors::WorkItemError;

/// Identifies a registered processing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// A whole file becomes one structured record.
    #[serde(alias = "ONE_FILE_ONE_OBJECT")]
    OneFileOneObject,
    /// A single table row becomes one structured record.
    #[serde(alias = "ONE_ROW_ONE_OBJECT")]
    OneRowOneObject,
}

impl StrategyKind {
    /// All known strategy kinds.
    pub const ALL: [Self; 2] = [Self::OneFileOneObject, Self::OneRowOneObject];

    /// Returns the wire representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneFileOneObject => "one_file_one_object",
            Self::OneRowOneObject => "one_row_one_object",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = WorkItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| WorkItemError::invalid("strategy_kind", format!("unknown kind '{s}'")))
    }
}

/// Whether status and identity are tracked per document or per sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One status entry per parent; the record identity is the parent id.
    Parent,
    /// One status entry per child; the record identity is freshly minted.
    Child,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Child => write!(f, "child"),
        }
    }
}

/// Locates a sub-unit (a spreadsheet row) inside its parent document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildLocator {
    /// Sheet name.
    pub sheet: String,
    /// Row number within the sheet.
    pub row: u64,
}

impl ChildLocator {
    /// Creates a new child locator.
    #[must_use]
    pub fn new(sheet: impl Into<String>, row: u64) -> Self {
        Self {
            sheet: sheet.into(),
            row,
        }
    }
}

impl fmt::Display for ChildLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sheet, self.row)
    }
}

impl FromStr for ChildLocator {
    type Err = WorkItemError;

    /// Parses the `sheet:row` form. Sheet names may contain colons; the row
    /// is whatever follows the last one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, row) = s
            .rsplit_once(':')
            .ok_or_else(|| WorkItemError::invalid("child_locator", "expected 'sheet:row'"))?;
        let row: u64 = row
            .trim()
            .parse()
            .map_err(|_| WorkItemError::invalid("child_locator", format!("bad row '{row}'")))?;
        Ok(Self::new(sheet, row))
    }
}

/// One unit of work delivered by the message transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Registered strategy that should process the item.
    pub strategy_kind: StrategyKind,
    /// The owning document or upload.
    pub parent_id: RecordId,
    /// Present only for child-granularity strategies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_locator: Option<ChildLocator>,
    /// Strategy-specific fields.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl WorkItem {
    /// Creates a parent-level work item.
    #[must_use]
    pub fn parent(kind: StrategyKind, parent_id: impl Into<RecordId>) -> Self {
        Self {
            strategy_kind: kind,
            parent_id: parent_id.into(),
            child_locator: None,
            payload: Map::new(),
        }
    }

    /// Creates a child-level work item.
    #[must_use]
    pub fn child(kind: StrategyKind, parent_id: impl Into<RecordId>, locator: ChildLocator) -> Self {
        Self {
            strategy_kind: kind,
            parent_id: parent_id.into(),
            child_locator: Some(locator),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Returns a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns a payload field that must be a string.
    pub fn require_str(&self, key: &str) -> Result<&str, WorkItemError> {
        match self.payload.get(key) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(WorkItemError::invalid(
                key,
                format!("expected a string, found {other}"),
            )),
            None => Err(WorkItemError::MissingField(key.to_string())),
        }
    }

    /// Returns the granularity implied by the presence of a child locator.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        if self.child_locator.is_some() {
            Granularity::Child
        } else {
            Granularity::Parent
        }
    }

    /// Checks the locator against the granularity the strategy expects.
    pub fn ensure_granularity(&self, expected: Granularity) -> Result<(), WorkItemError> {
        match (expected, self.child_locator.is_some()) {
            (Granularity::Child, false) => Err(WorkItemError::GranularityMismatch {
                kind: self.strategy_kind,
                expectation: "requires a child locator",
            }),
            (Granularity::Parent, true) => Err(WorkItemError::GranularityMismatch {
                kind: self.strategy_kind,
                expectation: "must not carry a child locator",
            }),
            _ => Ok(()),
        }
    }

    /// Parses a transport message body into a work item.
    ///
    /// Accepts either the structured shape
    /// `{strategy_kind, parent_id, child_locator?, payload}` or a flat body
    /// where every field other than the routing fields is payload. When no
    /// explicit locator is given, `sheet` and `data_row` payload fields
    /// produce one.
    pub fn from_message(body: &Value) -> Result<Self, WorkItemError> {
        let object = body
            .as_object()
            .ok_or_else(|| WorkItemError::invalid("body", "expected a JSON object"))?;

        let strategy_kind: StrategyKind = match object.get("strategy_kind") {
            Some(Value::String(s)) => s.parse()?,
            Some(_) => return Err(WorkItemError::invalid("strategy_kind", "expected a string")),
            None => return Err(WorkItemError::MissingField("strategy_kind".to_string())),
        };

        let parent_id = match object.get("parent_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => RecordId::new(s.trim()),
            Some(_) => return Err(WorkItemError::invalid("parent_id", "expected a non-empty string")),
            None => return Err(WorkItemError::MissingField("parent_id".to_string())),
        };

        let payload = match object.get("payload") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(WorkItemError::invalid("payload", "expected an object")),
            None => object
                .iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "strategy_kind" | "parent_id" | "child_locator")
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };

        let child_locator: Option<ChildLocator> = match object.get("child_locator") {
            Some(Value::Null) | None => locator_from_payload(&payload)?,
            Some(Value::String(s)) => Some(s.parse()?),
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|e| WorkItemError::invalid("child_locator", e.to_string()))?,
            ),
        };

        Ok(Self {
            strategy_kind,
            parent_id,
            child_locator,
            payload,
        })
    }
}

fn locator_from_payload(payload: &Map<String, Value>) -> Result<Option<ChildLocator>, WorkItemError> {
    let (Some(sheet), Some(row)) = (payload.get("sheet"), payload.get("data_row")) else {
        return Ok(None);
    };

    let sheet = match sheet {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let row = match row {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| WorkItemError::invalid("data_row", format!("bad row {n}")))?,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| WorkItemError::invalid("data_row", format!("bad row '{s}'")))?,
        other => return Err(WorkItemError::invalid("data_row", format!("bad row {other}"))),
    };

    Ok(Some(ChildLocator::new(sheet, row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!(
            "one_row_one_object".parse::<StrategyKind>().unwrap(),
            StrategyKind::OneRowOneObject
        );
        assert_eq!(
            "ONE_FILE_ONE_OBJECT".parse::<StrategyKind>().unwrap(),
            StrategyKind::OneFileOneObject
        );
        assert!("many_files".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_child_locator_round_trip_text() {
        let locator = ChildLocator::new("Rates: EU", 12);
        assert_eq!(locator.to_string(), "Rates: EU:12");
        assert_eq!("Rates: EU:12".parse::<ChildLocator>().unwrap(), locator);
        assert!("no-row".parse::<ChildLocator>().is_err());
    }

    #[test]
    fn test_from_message_structured() {
        let body = json!({
            "strategy_kind": "one_file_one_object",
            "parent_id": "upload-1",
            "payload": {"key": "uploads/a.pdf"}
        });
        let item = WorkItem::from_message(&body).unwrap();
        assert_eq!(item.parent_id, RecordId::new("upload-1"));
        assert_eq!(item.granularity(), Granularity::Parent);
        assert_eq!(item.require_str("key").unwrap(), "uploads/a.pdf");
    }

    #[test]
    fn test_from_message_flat_derives_locator() {
        let body = json!({
            "strategy_kind": "ONE_ROW_ONE_OBJECT",
            "parent_id": "upload-2",
            "sheet": "Prices",
            "data_row": "7",
            "item": {"Country": "Spain"}
        });
        let item = WorkItem::from_message(&body).unwrap();
        assert_eq!(item.child_locator, Some(ChildLocator::new("Prices", 7)));
        assert_eq!(item.field("item"), Some(&json!({"Country": "Spain"})));
        assert!(item.field("strategy_kind").is_none());
    }

    #[test]
    fn test_from_message_explicit_locator_object() {
        let body = json!({
            "strategy_kind": "one_row_one_object",
            "parent_id": "upload-3",
            "child_locator": {"sheet": "S1", "row": 4},
            "payload": {"item": {}}
        });
        let item = WorkItem::from_message(&body).unwrap();
        assert_eq!(item.child_locator, Some(ChildLocator::new("S1", 4)));
    }

    #[test]
    fn test_from_message_rejects_missing_fields() {
        let err = WorkItem::from_message(&json!({"parent_id": "x"})).unwrap_err();
        assert!(matches!(err, WorkItemError::MissingField(ref f) if f == "strategy_kind"));

        let err = WorkItem::from_message(&json!({"strategy_kind": "one_file_one_object"}))
            .unwrap_err();
        assert!(matches!(err, WorkItemError::MissingField(ref f) if f == "parent_id"));

        assert!(WorkItem::from_message(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_ensure_granularity() {
        let parent = WorkItem::parent(StrategyKind::OneFileOneObject, "p");
        assert!(parent.ensure_granularity(Granularity::Parent).is_ok());
        assert!(parent.ensure_granularity(Granularity::Child).is_err());

        let child = WorkItem::child(StrategyKind::OneRowOneObject, "p", ChildLocator::new("S", 1));
        assert!(child.ensure_granularity(Granularity::Child).is_ok());
        assert!(child.ensure_granularity(Granularity::Parent).is_err());
    }

    #[test]
    fn test_require_str_wrong_type() {
        let item = WorkItem::parent(StrategyKind::OneFileOneObject, "p").with_field("key", json!(5));
        assert!(matches!(
            item.require_str("key"),
            Err(WorkItemError::InvalidField { .. })
        ));
        assert!(matches!(
            item.require_str("missing"),
            Err(WorkItemError::MissingField(_))
        ));
    }
}
