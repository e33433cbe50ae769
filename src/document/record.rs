//! Document record type and field-path resolution

use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved identifier field
pub const ID_FIELD: &str = "_id";
/// Reserved creation timestamp field
pub const CREATED_FIELD: &str = "_created";
/// Reserved modification timestamp field
pub const MODIFIED_FIELD: &str = "_modified";

static NULL: Value = Value::Null;

/// A schema-less record: field name to JSON value.
///
/// Serializes transparently as a JSON object, which is also the on-disk
/// line format of the table log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value. Returns `None` unless the value is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Wraps an existing JSON map
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns the `_id` field if it is a string
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Returns the `_created` timestamp
    pub fn created(&self) -> Option<&str> {
        self.0.get(CREATED_FIELD).and_then(Value::as_str)
    }

    /// Returns the `_modified` timestamp
    pub fn modified(&self) -> Option<&str> {
        self.0.get(MODIFIED_FIELD).and_then(Value::as_str)
    }

    /// Returns a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Resolves a dot-separated field path such as `address.city`.
    ///
    /// Numeric segments index into arrays (`tags.0`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns true if the top-level field is present (null counts as present)
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the document has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over top-level fields
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrows the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Keeps only the requested top-level fields that are present
    pub fn project(&self, fields: &[String]) -> Document {
        let mut projected = Map::new();
        for field in fields {
            if let Some(value) = self.0.get(field) {
                projected.insert(field.clone(), value.clone());
            }
        }
        Document(projected)
    }

    pub(crate) fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub(crate) fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Serializes to a single log line (without the trailing newline)
    pub(crate) fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Parses a log line. Lines that are not objects with a string `_id`
    /// are rejected.
    pub(crate) fn parse_line(line: &[u8]) -> Option<Document> {
        let doc: Document = serde_json::from_slice(line).ok()?;
        doc.id()?;
        Some(doc)
    }
}

impl Index<&str> for Document {
    type Output = Value;

    /// Missing fields index to `null`, like `serde_json::Value`.
    fn index(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&NULL)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Document::from_value(json!({"a": 1})).is_some());
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_nested_path_resolution() {
        let d = doc(json!({"address": {"city": "Kigali", "zip": 250}, "tags": ["a", "b"]}));
        assert_eq!(d.get_path("address.city"), Some(&json!("Kigali")));
        assert_eq!(d.get_path("tags.1"), Some(&json!("b")));
        assert_eq!(d.get_path("address.street"), None);
        assert_eq!(d.get_path("address.city.name"), None);
        assert_eq!(d.get_path("missing"), None);
    }

    #[test]
    fn test_projection_omits_absent_fields() {
        let d = doc(json!({"_id": "1", "name": "a", "age": 3}));
        let projected = d.project(&["name".to_string(), "email".to_string()]);
        assert_eq!(projected.into_value(), json!({"name": "a"}));
    }

    #[test]
    fn test_parse_line_requires_string_id() {
        assert!(Document::parse_line(br#"{"_id":"x","v":1}"#).is_some());
        assert!(Document::parse_line(br#"{"v":1}"#).is_none());
        assert!(Document::parse_line(br#"{"_id":7}"#).is_none());
        assert!(Document::parse_line(b"{not json").is_none());
    }

    #[test]
    fn test_index_missing_is_null() {
        let d = doc(json!({"a": 1}));
        assert_eq!(d["a"], json!(1));
        assert!(d["b"].is_null());
    }
}
