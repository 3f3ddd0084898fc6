//! Watermarks and incremental diff results

use crate::document::{Document, Marker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest marker the client has observed, per collection
///
/// A missing entry means the client wants a full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatermarkMap(HashMap<String, Marker>);

impl WatermarkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: impl Into<String>, marker: Marker) -> Self {
        self.0.insert(collection.into(), marker);
        self
    }

    pub fn get(&self, collection: &str) -> Option<Marker> {
        self.0.get(collection).copied()
    }

    /// Whether a document with `marker` has already been seen for `collection`
    pub fn has_seen(&self, collection: &str, marker: Marker) -> bool {
        self.get(collection).map_or(false, |seen| marker <= seen)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Changed documents of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDiff {
    #[serde(rename = "coll")]
    pub collection: String,
    pub entries: Vec<Document>,
}

impl CollectionDiff {
    pub fn new(collection: impl Into<String>, entries: Vec<Document>) -> Self {
        Self {
            collection: collection.into(),
            entries,
        }
    }

    /// Highest marker among the entries, i.e. the client's next watermark
    pub fn high_watermark(&self) -> Option<Marker> {
        self.entries.iter().filter_map(Document::updated_at).max()
    }
}

/// Ordered per-collection changes produced by one publication invocation
///
/// An empty result tells the client to leave its state alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffResult(Vec<CollectionDiff>);

impl DiffResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result for one collection; empty when there are no entries
    pub fn single(collection: impl Into<String>, entries: Vec<Document>) -> Self {
        let mut diff = Self::empty();
        diff.push(CollectionDiff::new(collection, entries));
        diff
    }

    /// Append a collection diff, dropping it when it carries no entries
    pub fn push(&mut self, diff: CollectionDiff) {
        if !diff.entries.is_empty() {
            self.0.push(diff);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDiff> {
        self.0.iter()
    }

    pub fn entry_count(&self) -> usize {
        self.0.iter().map(|d| d.entries.len()).sum()
    }

    pub fn into_inner(self) -> Vec<CollectionDiff> {
        self.0
    }
}

impl FromIterator<CollectionDiff> for DiffResult {
    fn from_iter<I: IntoIterator<Item = CollectionDiff>>(iter: I) -> Self {
        let mut diff = Self::empty();
        for d in iter {
            diff.push(d);
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_watermark_has_seen() {
        let marks = WatermarkMap::new().with("users", Marker::new(100));

        assert!(marks.has_seen("users", Marker::new(100)));
        assert!(marks.has_seen("users", Marker::new(99)));
        assert!(!marks.has_seen("users", Marker::new(101)));
        assert!(!marks.has_seen("orders", Marker::new(1)));
    }

    #[test]
    fn test_watermark_wire_format() {
        let marks: WatermarkMap = serde_json::from_value(json!({"users": 5})).unwrap();
        assert_eq!(marks.get("users"), Some(Marker::new(5)));
    }

    #[test]
    fn test_empty_entries_are_dropped() {
        let diff = DiffResult::single("users", vec![]);
        assert!(diff.is_empty());

        let diff: DiffResult = vec![
            CollectionDiff::new("a", vec![Document::new()]),
            CollectionDiff::new("b", vec![]),
        ]
        .into_iter()
        .collect();
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn test_diff_serializes_with_coll_key() {
        let diff = DiffResult::single("orders", vec![Document::new().with("_id", "o1")]);
        assert_eq!(
            serde_json::to_value(&diff).unwrap(),
            json!([{"coll": "orders", "entries": [{"_id": "o1"}]}])
        );
    }

    #[test]
    fn test_high_watermark() {
        let mut a = Document::new();
        a.set_updated_at(Marker::new(3));
        let mut b = Document::new();
        b.set_updated_at(Marker::new(7));

        let diff = CollectionDiff::new("c", vec![a, b]);
        assert_eq!(diff.high_watermark(), Some(Marker::new(7)));
    }
}
