//! Document types and path access

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Field holding the document identifier
pub const ID_FIELD: &str = "_id";

/// Field holding the last-modified marker, maintained by the store
pub const UPDATED_AT_FIELD: &str = "__updatedAt";

/// Maximum document ID length in bytes
pub const MAX_ID_LEN: usize = 512;

/// Last-modified marker in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(i64);

impl Marker {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Marker for the current wall-clock time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Marker `millis` milliseconds before this one
    pub fn saturating_sub(&self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document identifier - non-empty UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > MAX_ID_LEN {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        Ok(Self(id))
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full document snapshot
///
/// Documents are JSON objects. Nested fields are addressed with dotted paths
/// such as `credits.free`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::MalformedDocument(format!(
                "expected an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set_path(path, value.into());
        self
    }

    pub fn id(&self) -> Option<DocumentId> {
        self.0
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DocumentId::new(s).ok())
    }

    pub fn set_id(&mut self, id: &DocumentId) {
        self.0.insert(ID_FIELD.into(), Value::String(id.as_str().into()));
    }

    pub fn updated_at(&self) -> Option<Marker> {
        self.0
            .get(UPDATED_AT_FIELD)
            .and_then(Value::as_i64)
            .map(Marker::new)
    }

    pub fn set_updated_at(&mut self, marker: Marker) {
        self.0.insert(UPDATED_AT_FIELD.into(), Value::from(marker.as_millis()));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a value at a dotted path (e.g., "credits.free")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a value at a dotted path, creating intermediate objects as needed
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return,
        };

        let mut current = &mut self.0;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    /// Remove the value at a dotted path, returning it if present
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = segments.split_last()?;

        let mut current = &mut self.0;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    /// Drop the named top-level fields
    pub fn strip(&mut self, fields: &[String]) {
        for field in fields {
            self.0.remove(field);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_valid() {
        assert!(DocumentId::new("user:123").is_ok());
        assert!(DocumentId::new("65f1c0ffee").is_ok());
    }

    #[test]
    fn test_document_id_invalid() {
        assert!(DocumentId::new("").is_err());
        assert!(DocumentId::new("a".repeat(513)).is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("doc")).is_err());
        assert!(Document::from_value(json!({"a": 1})).is_ok());
    }

    #[test]
    fn test_nested_path() {
        let mut doc = Document::new();
        doc.set_path("credits.free", json!(5));
        doc.set_path("credits.paid", json!(2));

        assert_eq!(doc.get_path("credits.free"), Some(&json!(5)));
        assert_eq!(doc.get("credits"), Some(&json!({"free": 5, "paid": 2})));

        assert_eq!(doc.remove_path("credits.free"), Some(json!(5)));
        assert!(doc.get_path("credits.free").is_none());
    }

    #[test]
    fn test_set_path_replaces_scalar_parent() {
        let mut doc = Document::new().with("credits", 3);
        doc.set_path("credits.free", json!(1));
        assert_eq!(doc.get_path("credits.free"), Some(&json!(1)));
    }

    #[test]
    fn test_id_and_marker() {
        let mut doc = Document::new();
        assert!(doc.id().is_none());
        assert!(doc.updated_at().is_none());

        doc.set_id(&DocumentId::new("u1").unwrap());
        doc.set_updated_at(Marker::new(42));
        assert_eq!(doc.id().unwrap().as_str(), "u1");
        assert_eq!(doc.updated_at(), Some(Marker::new(42)));
    }

    #[test]
    fn test_strip() {
        let mut doc = Document::new()
            .with("name", "dragon")
            .with("password", "hunter2")
            .with("services", json!({"google": {}}));
        doc.strip(&["password".to_string(), "services".to_string()]);

        assert!(doc.contains("name"));
        assert!(!doc.contains("password"));
        assert!(!doc.contains("services"));
    }

    #[test]
    fn test_marker_now_is_wall_clock_millis() {
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64;
        let now = Marker::now().as_millis();
        assert!(now >= before);
        assert!(now - before < 60_000);
    }
}
