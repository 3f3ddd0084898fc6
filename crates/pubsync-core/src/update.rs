//! Typed update operations applied by `update_one`

use crate::document::{type_name, Document, ID_FIELD};
use crate::error::{Error, Result};
use serde_json::Value;

/// A single field-level update operation
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    Unset(String),
    /// Add to an integer field, treating a missing field as zero
    Inc(String, i64),
    /// Append to an array field, creating it if missing
    Push(String, Value),
    /// Remove every equal element from an array field
    Pull(String, Value),
}

impl UpdateOp {
    pub fn path(&self) -> &str {
        match self {
            UpdateOp::Set(p, _)
            | UpdateOp::Unset(p)
            | UpdateOp::Inc(p, _)
            | UpdateOp::Push(p, _)
            | UpdateOp::Pull(p, _) => p,
        }
    }
}

/// An ordered list of update operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: UpdateOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn set(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(UpdateOp::Set(path.into(), value.into()))
    }

    pub fn unset(self, path: impl Into<String>) -> Self {
        self.op(UpdateOp::Unset(path.into()))
    }

    pub fn inc(self, path: impl Into<String>, delta: i64) -> Self {
        self.op(UpdateOp::Inc(path.into(), delta))
    }

    pub fn push(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(UpdateOp::Push(path.into(), value.into()))
    }

    pub fn pull(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(UpdateOp::Pull(path.into(), value.into()))
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to `doc`
    ///
    /// The document is left untouched when any operation fails, so callers
    /// can apply to a working copy and commit only on success.
    pub fn apply(&self, doc: &Document) -> Result<Document> {
        let mut next = doc.clone();
        for op in &self.ops {
            if op.path() == ID_FIELD {
                return Err(Error::InvalidUpdate("_id is immutable".into()));
            }
            match op {
                UpdateOp::Set(path, value) => next.set_path(path, value.clone()),
                UpdateOp::Unset(path) => {
                    next.remove_path(path);
                }
                UpdateOp::Inc(path, delta) => {
                    let current = match next.get_path(path) {
                        None => 0,
                        Some(v) => v.as_i64().ok_or_else(|| {
                            Error::InvalidUpdate(format!(
                                "cannot increment {} field {}",
                                type_name(v),
                                path
                            ))
                        })?,
                    };
                    let sum = current.checked_add(*delta).ok_or_else(|| {
                        Error::InvalidUpdate(format!("incrementing {} by {} overflows", path, delta))
                    })?;
                    next.set_path(path, Value::from(sum));
                }
                UpdateOp::Push(path, value) => {
                    let mut items = array_at(&next, path)?;
                    items.push(value.clone());
                    next.set_path(path, Value::Array(items));
                }
                UpdateOp::Pull(path, value) => {
                    let mut items = array_at(&next, path)?;
                    items.retain(|item| item != value);
                    next.set_path(path, Value::Array(items));
                }
            }
        }
        Ok(next)
    }
}

fn array_at(doc: &Document, path: &str) -> Result<Vec<Value>> {
    match doc.get_path(path) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(Error::InvalidUpdate(format!(
            "{} is a {}, not an array",
            path,
            type_name(other)
        ))),
    }
}
