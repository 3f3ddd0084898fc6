//! Committing client mutations through the access gate

use crate::access::{AccessControl, Decision, EvaluatorContext, Operation, ProposedChange, ACCESS_DENIED};
use crate::context::Auth;
use pubsync_core::{Filter, Result, Update};
use pubsync_storage::{Store, StoreError};
use serde_json::Value;
use tracing::debug;

/// Result of one proposed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied,
    Denied { reason: String },
    /// The targeted document does not exist
    Missing,
    /// An insert collided with an existing `_id`
    Conflict,
}

impl ChangeOutcome {
    /// Wire code for this outcome
    pub fn code(&self) -> &str {
        match self {
            ChangeOutcome::Applied => "OK",
            ChangeOutcome::Denied { reason } => reason,
            ChangeOutcome::Missing => "NOT_FOUND",
            ChangeOutcome::Conflict => "DUPLICATE_ID",
        }
    }
}

/// Resolve what the access rules need to know about the caller
pub async fn evaluator_context(auth: &Auth, store: &dyn Store) -> Result<EvaluatorContext> {
    Ok(EvaluatorContext {
        identity: auth.identity().await?,
        privileged: auth.is_privileged(store).await?,
    })
}

fn denied(collection: &str, operation: Operation, reason: String, ctx: &EvaluatorContext) -> ChangeOutcome {
    debug!(collection, %operation, identity = %ctx.identity, reason = %reason, "Change denied");
    ChangeOutcome::Denied { reason }
}

/// Screen a change with the access rules and commit it only when allowed
///
/// Malformed changes are denied. Store failures are returned as errors.
pub async fn commit(
    access: &AccessControl,
    store: &dyn Store,
    collection: &str,
    operation: Operation,
    raw: &Value,
    ctx: &EvaluatorContext,
) -> Result<ChangeOutcome> {
    let change = match ProposedChange::parse(operation, raw) {
        Ok(change) => change,
        Err(e) => {
            debug!(collection, %operation, error = %e, "Malformed change");
            return Ok(denied(collection, operation, ACCESS_DENIED.into(), ctx));
        }
    };

    if let Decision::Deny { reason } = access.evaluate(collection, &change, ctx) {
        return Ok(denied(collection, operation, reason, ctx));
    }

    let outcome = match change {
        ProposedChange::Insert(doc) => match store.insert(collection, doc).await {
            Ok(_) => ChangeOutcome::Applied,
            Err(StoreError::Duplicate { .. }) => ChangeOutcome::Conflict,
            Err(e) => return Err(e.into()),
        },
        ProposedChange::Update { id, patch } => {
            let mut update = Update::new();
            for op in &patch {
                match op.to_update_op() {
                    Ok(op) => update = update.op(op),
                    Err(_) => return Ok(denied(collection, operation, ACCESS_DENIED.into(), ctx)),
                }
            }
            if store.update_one(collection, &Filter::by_id(&id), &update).await?.matched() {
                ChangeOutcome::Applied
            } else {
                ChangeOutcome::Missing
            }
        }
        ProposedChange::Remove(id) => {
            if store.remove(collection, &Filter::by_id(&id)).await? {
                ChangeOutcome::Applied
            } else {
                ChangeOutcome::Missing
            }
        }
    };

    debug!(collection, %operation, identity = %ctx.identity, outcome = outcome.code(), "Change committed");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Rule;
    use crate::testing::{context_for, seeded_store};
    use pubsync_core::WatermarkMap;
    use serde_json::json;

    fn rules() -> AccessControl {
        let mut access = AccessControl::new();
        for op in Operation::ALL {
            access.register_rule("users", op, Rule::Privileged);
            access.register_rule("creditCodes", op, Rule::Privileged);
        }
        access.register_rule("users", Operation::Update, Rule::single_field_patch("dob"));
        access.register_rule("users", Operation::Update, Rule::deny(ACCESS_DENIED));
        access
    }

    async fn eval_ctx(store: &dyn Store, session: Option<&str>) -> EvaluatorContext {
        let ctx = context_for(session, WatermarkMap::new());
        evaluator_context(&ctx.auth, store).await.unwrap()
    }

    #[tokio::test]
    async fn test_allowed_patch_is_committed() {
        let store = seeded_store().await;
        let ctx = eval_ctx(store.as_ref(), Some("bob-sid")).await;
        let change = json!({"_id": "bob", "patch": [{"op": "add", "path": "/dob", "value": "1990-01-01"}]});

        let outcome = commit(&rules(), store.as_ref(), "users", Operation::Update, &change, &ctx).await.unwrap();
        assert_eq!(outcome, ChangeOutcome::Applied);

        let bob = store.find_one("users", &Filter::new().eq("_id", "bob")).await.unwrap().unwrap();
        assert_eq!(bob.get("dob"), Some(&json!("1990-01-01")));
    }

    #[tokio::test]
    async fn test_denied_change_is_not_committed() {
        let store = seeded_store().await;
        let ctx = eval_ctx(store.as_ref(), Some("bob-sid")).await;
        let change = json!({"_id": "bob", "patch": [
            {"op": "replace", "path": "/dob", "value": "1990-01-01"},
            {"op": "replace", "path": "/admin", "value": true}
        ]});

        let outcome = commit(&rules(), store.as_ref(), "users", Operation::Update, &change, &ctx).await.unwrap();
        assert_eq!(outcome, ChangeOutcome::Denied { reason: ACCESS_DENIED.into() });

        let bob = store.find_one("users", &Filter::new().eq("_id", "bob")).await.unwrap().unwrap();
        assert!(!bob.contains("dob"));
        assert!(!bob.contains("admin"));
    }

    #[tokio::test]
    async fn test_admin_manages_credit_codes() {
        let store = seeded_store().await;
        let admin = eval_ctx(store.as_ref(), Some("admin-sid")).await;
        let access = rules();

        let insert = json!({"_id": "c2", "name": "SPRING", "credits": 5, "used": 0, "total": 10});
        assert_eq!(commit(&access, store.as_ref(), "creditCodes", Operation::Insert, &insert, &admin).await.unwrap(), ChangeOutcome::Applied);
        assert_eq!(commit(&access, store.as_ref(), "creditCodes", Operation::Insert, &insert, &admin).await.unwrap(), ChangeOutcome::Conflict);

        let remove = json!("c2");
        assert_eq!(commit(&access, store.as_ref(), "creditCodes", Operation::Remove, &remove, &admin).await.unwrap(), ChangeOutcome::Applied);
        assert_eq!(commit(&access, store.as_ref(), "creditCodes", Operation::Remove, &remove, &admin).await.unwrap(), ChangeOutcome::Missing);
    }

    #[tokio::test]
    async fn test_regular_user_cannot_touch_credit_codes() {
        let store = seeded_store().await;
        let bob = eval_ctx(store.as_ref(), Some("bob-sid")).await;
        let patch = json!({"_id": "c1", "patch": [{"op": "replace", "path": "/total", "value": 1000}]});

        let outcome = commit(&rules(), store.as_ref(), "creditCodes", Operation::Update, &patch, &bob).await.unwrap();
        assert!(matches!(outcome, ChangeOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn test_malformed_change_is_denied() {
        let store = seeded_store().await;
        let admin = eval_ctx(store.as_ref(), Some("admin-sid")).await;

        let outcome = commit(&rules(), store.as_ref(), "users", Operation::Update, &json!([1, 2, 3]), &admin).await.unwrap();
        assert_eq!(outcome.code(), ACCESS_DENIED);
    }
}
