//! Typed query filters and find options
//!
//! Filters are conjunctions of `(path, predicate)` clauses. Paths are dotted
//! and resolve against nested objects. Comparison semantics follow the usual
//! document-store conventions: a missing field never satisfies a comparison,
//! and equality against an array field matches when any element is equal.

use crate::document::{Document, ID_FIELD};
use serde_json::Value;
use std::cmp::Ordering;

/// A single predicate applied to the value found at a path
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Exists(bool),
    /// Field is absent, or is an array that does not contain the value
    NotContains(Value),
}

impl Predicate {
    fn matches(&self, found: Option<&Value>) -> bool {
        match self {
            Predicate::Eq(expected) => found.map_or(false, |v| value_eq(v, expected)),
            Predicate::Ne(expected) => !found.map_or(false, |v| value_eq(v, expected)),
            Predicate::Gt(bound) => cmp_found(found, bound) == Some(Ordering::Greater),
            Predicate::Gte(bound) => matches!(
                cmp_found(found, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::Lt(bound) => cmp_found(found, bound) == Some(Ordering::Less),
            Predicate::Lte(bound) => matches!(
                cmp_found(found, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Exists(expected) => found.is_some() == *expected,
            Predicate::NotContains(needle) => match found {
                None => true,
                Some(Value::Array(items)) => !items.iter().any(|v| scalar_eq(v, needle)),
                Some(other) => !scalar_eq(other, needle),
            },
        }
    }
}

/// Conjunctive filter over document fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Predicate)>,
}

impl Filter {
    /// Filter matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching the document with the given `_id`
    pub fn by_id(id: &crate::DocumentId) -> Self {
        Self::new().eq(ID_FIELD, id.as_str())
    }

    pub fn with(mut self, path: impl Into<String>, predicate: Predicate) -> Self {
        self.clauses.push((path.into(), predicate));
        self
    }

    pub fn eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Eq(value.into()))
    }

    pub fn ne(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Ne(value.into()))
    }

    pub fn gt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Gt(value.into()))
    }

    pub fn gte(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Gte(value.into()))
    }

    pub fn lt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Lt(value.into()))
    }

    pub fn lte(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::Lte(value.into()))
    }

    pub fn exists(self, path: impl Into<String>, present: bool) -> Self {
        self.with(path, Predicate::Exists(present))
    }

    pub fn not_contains(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Predicate::NotContains(value.into()))
    }

    /// Combine two filters into one that requires both
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    pub fn clauses(&self) -> &[(String, Predicate)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Check whether a document satisfies every clause
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(path, predicate)| predicate.matches(doc.get_path(path)))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort by a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    /// Compare two documents by the sort field; missing values sort first
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = match (a.get_path(&self.field), b.get_path(&self.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Inclusion projection; `_id` is always kept
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn apply(&self, doc: &Document) -> Document {
        let mut projected = Document::new();
        if let Some(id) = doc.get(ID_FIELD) {
            projected.set_path(ID_FIELD, id.clone());
        }
        for field in &self.fields {
            if let Some(value) = doc.get_path(field) {
                projected.set_path(field, value.clone());
            }
        }
        projected
    }
}

/// Options for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

fn cmp_found(found: Option<&Value>, bound: &Value) -> Option<Ordering> {
    compare_values(found?, bound)
}

/// Order two scalar values of the same kind; mixed kinds are incomparable
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn value_eq(found: &Value, expected: &Value) -> bool {
    if scalar_eq(found, expected) {
        return true;
    }
    match found {
        Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| scalar_eq(item, expected))
        }
        _ => false,
    }
}
