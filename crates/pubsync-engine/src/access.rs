//! Access control for client mutations
//!
//! Rules are registered per `(collection, operation)` and evaluated in
//! registration order. The first decisive rule wins: `Allow` short-circuits
//! to allow, `Deny(reason)` short-circuits to deny. A chain where every rule
//! abstains, or a pair with no rules at all, is denied.
//!
//! Evaluation is synchronous and never touches the store. Anything that
//! needs I/O, such as the privilege flag, is resolved into the
//! [`EvaluatorContext`] beforehand.

use pubsync_core::{Document, DocumentId, Error, Identity, Result, UpdateOp, ID_FIELD};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Reason reported when no rule allows a change
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Remove,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Remove];
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "remove" | "delete" => Ok(Operation::Remove),
            _ => Err(Error::MalformedChange(format!("Unknown operation: {}", s))),
        }
    }
}

/// JSON-Patch operation kinds accepted in updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Add,
    Replace,
    Remove,
}

/// One JSON-Patch operation, e.g. `{"op": "replace", "path": "/dob", "value": "..."}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchOp {
    pub op: PatchKind,
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl PatchOp {
    /// Decoded pointer segments; `None` unless the path is a well-formed pointer
    fn segments(&self) -> Option<Vec<String>> {
        let rest = self.path.strip_prefix('/')?;
        let segments: Vec<String> = rest
            .split('/')
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect();
        if segments.iter().any(|s| s.is_empty() || s.contains('.')) {
            return None;
        }
        Some(segments)
    }

    /// Whether this operation touches exactly the top-level `field`
    pub fn touches_only(&self, field: &str) -> bool {
        matches!(self.segments(), Some(segments) if segments.len() == 1 && segments[0] == field)
    }

    /// Translate into a store update operation
    pub fn to_update_op(&self) -> Result<UpdateOp> {
        let path = self
            .segments()
            .ok_or_else(|| Error::MalformedChange(format!("Invalid patch path: {}", self.path)))?
            .join(".");

        match (self.op, &self.value) {
            (PatchKind::Add | PatchKind::Replace, Some(value)) => Ok(UpdateOp::Set(path, value.clone())),
            (PatchKind::Remove, None) => Ok(UpdateOp::Unset(path)),
            (PatchKind::Remove, Some(_)) => Err(Error::MalformedChange("remove takes no value".into())),
            (_, None) => Err(Error::MalformedChange(format!("{} requires a value", self.path))),
        }
    }
}

/// A mutation a client wants committed
#[derive(Debug, Clone, PartialEq)]
pub enum ProposedChange {
    Insert(Document),
    Update { id: DocumentId, patch: Vec<PatchOp> },
    Remove(DocumentId),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUpdate {
    #[serde(rename = "_id")]
    id: String,
    patch: Vec<PatchOp>,
}

impl ProposedChange {
    pub fn operation(&self) -> Operation {
        match self {
            ProposedChange::Insert(_) => Operation::Insert,
            ProposedChange::Update { .. } => Operation::Update,
            ProposedChange::Remove(_) => Operation::Remove,
        }
    }

    /// Parse the wire shape of a change
    ///
    /// - insert: the full document
    /// - update: `{"_id": "...", "patch": [...]}` with at least one operation
    /// - remove: the id, or `{"_id": "..."}`
    pub fn parse(operation: Operation, raw: &Value) -> Result<Self> {
        match operation {
            Operation::Insert => Ok(ProposedChange::Insert(Document::from_value(raw.clone())?)),
            Operation::Update => {
                let update: RawUpdate = serde_json::from_value(raw.clone())
                    .map_err(|e| Error::MalformedChange(e.to_string()))?;
                if update.patch.is_empty() {
                    return Err(Error::MalformedChange("empty patch".into()));
                }
                Ok(ProposedChange::Update {
                    id: DocumentId::new(update.id)?,
                    patch: update.patch,
                })
            }
            Operation::Remove => {
                let id = match raw {
                    Value::String(id) => id.as_str(),
                    Value::Object(map) => map
                        .get(ID_FIELD)
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::MalformedChange("remove without _id".into()))?,
                    _ => return Err(Error::MalformedChange("remove expects an id".into())),
                };
                Ok(ProposedChange::Remove(DocumentId::new(id)?))
            }
        }
    }
}

/// What the evaluator knows about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluatorContext {
    pub identity: Identity,
    pub privileged: bool,
}

/// Verdict of a single rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Allow,
    Abstain,
    Deny(String),
}

/// Rule with arbitrary logic, for cases the built-in variants can't express
pub trait AccessRule: Send + Sync {
    fn evaluate(&self, change: &ProposedChange, ctx: &EvaluatorContext) -> RuleOutcome;
}

/// Registered rule
#[derive(Clone)]
pub enum Rule {
    /// Allow privileged callers, abstain otherwise
    Privileged,
    /// Allow a patch that consists of exactly one operation on `field`
    SingleFieldPatch { field: String },
    /// Deny with the given reason
    Deny { reason: String },
    Custom(Arc<dyn AccessRule>),
}

impl Rule {
    pub fn single_field_patch(field: impl Into<String>) -> Self {
        Rule::SingleFieldPatch { field: field.into() }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Rule::Deny { reason: reason.into() }
    }

    pub fn evaluate(&self, change: &ProposedChange, ctx: &EvaluatorContext) -> RuleOutcome {
        match self {
            Rule::Privileged if ctx.privileged => RuleOutcome::Allow,
            Rule::Privileged => RuleOutcome::Abstain,
            Rule::SingleFieldPatch { field } => match change {
                ProposedChange::Update { patch, .. } if patch.len() == 1 && patch[0].touches_only(field) => {
                    RuleOutcome::Allow
                }
                _ => RuleOutcome::Abstain,
            },
            Rule::Deny { reason } => RuleOutcome::Deny(reason.clone()),
            Rule::Custom(rule) => rule.evaluate(change, ctx),
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Privileged => write!(f, "Privileged"),
            Rule::SingleFieldPatch { field } => write!(f, "SingleFieldPatch({})", field),
            Rule::Deny { reason } => write!(f, "Deny({})", reason),
            Rule::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Final decision for a proposed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    fn denied() -> Self {
        Decision::Deny {
            reason: ACCESS_DENIED.to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Rule registry and interpreter
#[derive(Debug, Default)]
pub struct AccessControl {
    rules: HashMap<(String, Operation), Vec<Rule>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to the chain for `(collection, operation)`
    pub fn register_rule(&mut self, collection: impl Into<String>, operation: Operation, rule: Rule) {
        self.rules
            .entry((collection.into(), operation))
            .or_default()
            .push(rule);
    }

    /// Whether any rule is registered for `collection`
    pub fn is_guarded(&self, collection: &str) -> bool {
        self.rules.keys().any(|(c, _)| c == collection)
    }

    /// Collections with at least one rule
    pub fn guarded_collections(&self) -> Vec<&str> {
        let mut collections: Vec<&str> = self.rules.keys().map(|(c, _)| c.as_str()).collect();
        collections.sort_unstable();
        collections.dedup();
        collections
    }

    pub fn evaluate(&self, collection: &str, change: &ProposedChange, ctx: &EvaluatorContext) -> Decision {
        let chain = match self.rules.get(&(collection.to_string(), change.operation())) {
            Some(chain) => chain,
            None => return Decision::denied(),
        };

        for rule in chain {
            match rule.evaluate(change, ctx) {
                RuleOutcome::Allow => return Decision::Allow,
                RuleOutcome::Deny(reason) => return Decision::Deny { reason },
                RuleOutcome::Abstain => continue,
            }
        }

        Decision::denied()
    }

    /// Evaluate a change still in wire form; an unparseable change is denied
    pub fn evaluate_raw(
        &self,
        collection: &str,
        operation: Operation,
        raw: &Value,
        ctx: &EvaluatorContext,
    ) -> Decision {
        match ProposedChange::parse(operation, raw) {
            Ok(change) => self.evaluate(collection, &change, ctx),
            Err(_) => Decision::denied(),
        }
    }
}
