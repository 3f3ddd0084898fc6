//! Credit code redemption

use crate::context::{own_record, RequestContext, USERS_COLLECTION};
use crate::method::Method;
use async_trait::async_trait;
use pubsync_core::{Document, Error, Filter, MethodResult, Result, Update, ID_FIELD};
use pubsync_storage::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const CREDIT_CODES_COLLECTION: &str = "creditCodes";

/// User field listing redeemed code names
pub const REDEEMED_FIELD: &str = "redeemedCreditCodes";

/// User field receiving redeemed credits
pub const FREE_CREDITS_FIELD: &str = "credits.free";

pub const ALREADY_REDEEMED: &str = "ALREADY_REDEEMED";
pub const NO_SUCH_CODE: &str = "NO_SUCH_CODE";
pub const MAXIMUM_REACHED: &str = "MAXIMUM_REACHED";

/// A redemption code; `0 <= used <= total`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCode {
    pub name: String,
    pub credits: i64,
    pub used: i64,
    pub total: i64,
}

impl CreditCode {
    pub fn new(name: impl Into<String>, credits: i64, total: i64) -> Self {
        Self {
            name: name.into(),
            credits,
            used: 0,
            total,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.total
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        serde_json::from_value(doc.clone().into_value()).map_err(|e| Error::MalformedDocument(e.to_string()))
    }

    pub fn to_document(&self) -> Result<Document> {
        let value = serde_json::to_value(self).map_err(|e| Error::MalformedDocument(e.to_string()))?;
        Document::from_value(value)
    }
}

/// How steps "check capacity, credit user, count use" are sequenced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionMode {
    /// Check-then-act across documents; concurrent redemptions of the last
    /// use can both succeed and push `used` past `total`
    #[default]
    Relaxed,
    /// Conditional writes: the code's counter only moves while `used < total`,
    /// and the user's credit is rolled back when it doesn't
    Atomic,
}

impl std::str::FromStr for RedemptionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relaxed" => Ok(RedemptionMode::Relaxed),
            "atomic" => Ok(RedemptionMode::Atomic),
            other => Err(format!("unknown redemption mode: {}", other)),
        }
    }
}

#[derive(Deserialize)]
struct RedeemArgs {
    #[serde(rename = "creditCode")]
    credit_code: String,
}

/// `redeemCreditCode { creditCode }`
pub struct RedeemCreditCode {
    mode: RedemptionMode,
}

impl RedeemCreditCode {
    pub fn new(mode: RedemptionMode) -> Self {
        Self { mode }
    }
}

fn has_redeemed(user: &Document, name: &str) -> bool {
    user.get(REDEEMED_FIELD)
        .and_then(Value::as_array)
        .map_or(false, |codes| codes.iter().any(|c| c.as_str() == Some(name)))
}

#[async_trait]
impl Method for RedeemCreditCode {
    async fn call(&self, store: &dyn Store, args: &Value, ctx: &RequestContext) -> Result<MethodResult> {
        let uid = ctx
            .auth
            .user_id()
            .await?
            .ok_or_else(|| Error::NotAuthenticated("redeemCreditCode".into()))?;
        let args: RedeemArgs =
            serde_json::from_value(args.clone()).map_err(|e| Error::InvalidArguments(e.to_string()))?;
        let name = args.credit_code;

        let user = store
            .find_one(USERS_COLLECTION, &own_record(&uid))
            .await?
            .ok_or_else(|| Error::MissingRecord {
                collection: USERS_COLLECTION.into(),
                id: uid.to_string(),
            })?;
        if has_redeemed(&user, &name) {
            return Ok(MethodResult::error(ALREADY_REDEEMED));
        }

        let code_doc = match store
            .find_one(CREDIT_CODES_COLLECTION, &Filter::new().eq("name", name.as_str()))
            .await?
        {
            Some(doc) => doc,
            None => return Ok(MethodResult::error(NO_SUCH_CODE)),
        };
        let code_id = code_doc.id().ok_or_else(|| {
            Error::MalformedDocument(format!("credit code {} has no {}", name, ID_FIELD))
        })?;
        let code = CreditCode::from_document(&code_doc)?;

        if code.is_exhausted() {
            return Ok(MethodResult::error(MAXIMUM_REACHED));
        }

        let credit = Update::new()
            .inc(FREE_CREDITS_FIELD, code.credits)
            .push(REDEEMED_FIELD, name.as_str());
        let count_use = Update::new().inc("used", 1);

        match self.mode {
            RedemptionMode::Relaxed => {
                store.update_one(USERS_COLLECTION, &own_record(&uid), &credit).await?;
                store
                    .update_one(CREDIT_CODES_COLLECTION, &Filter::by_id(&code_id), &count_use)
                    .await?;
            }
            RedemptionMode::Atomic => {
                let not_yet_redeemed = own_record(&uid).not_contains(REDEEMED_FIELD, name.as_str());
                if !store.update_one(USERS_COLLECTION, &not_yet_redeemed, &credit).await?.matched() {
                    return Ok(MethodResult::error(ALREADY_REDEEMED));
                }

                let has_capacity = Filter::by_id(&code_id).lt("used", code.total);
                if !store
                    .update_one(CREDIT_CODES_COLLECTION, &has_capacity, &count_use)
                    .await?
                    .matched()
                {
                    let rollback = Update::new()
                        .inc(FREE_CREDITS_FIELD, -code.credits)
                        .pull(REDEEMED_FIELD, name.as_str());
                    store.update_one(USERS_COLLECTION, &own_record(&uid), &rollback).await?;
                    warn!(user = %uid, code = %name, "Lost redemption race, credit rolled back");
                    return Ok(MethodResult::error(MAXIMUM_REACHED));
                }
            }
        }

        info!(user = %uid, code = %name, credits = code.credits, "Credit code redeemed");
        Ok(MethodResult::success().with("credits", code.credits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context_for, seeded_store};
    use pubsync_core::WatermarkMap;
    use serde_json::json;
    use std::sync::Arc;

    async fn redeem(store: &Arc<dyn Store>, mode: RedemptionMode, session: Option<&str>, code: &str) -> Result<MethodResult> {
        let ctx = context_for(session, WatermarkMap::new());
        RedeemCreditCode::new(mode)
            .call(store.as_ref(), &json!({"creditCode": code}), &ctx)
            .await
    }

    async fn user(store: &Arc<dyn Store>, id: &str) -> Document {
        store.find_one("users", &Filter::new().eq("_id", id)).await.unwrap().unwrap()
    }

    async fn code(store: &Arc<dyn Store>, name: &str) -> CreditCode {
        let doc = store.find_one("creditCodes", &Filter::new().eq("name", name)).await.unwrap().unwrap();
        CreditCode::from_document(&doc).unwrap()
    }

    #[tokio::test]
    async fn test_redeem_then_retry() {
        for mode in [RedemptionMode::Relaxed, RedemptionMode::Atomic] {
            let store = seeded_store().await;

            let result = redeem(&store, mode, Some("alice-sid"), "WELCOME10").await.unwrap();
            assert_eq!(serde_json::to_value(&result).unwrap(), json!({"$success": true, "credits": 10}));
            assert_eq!(user(&store, "alice").await.get_path("credits.free"), Some(&json!(10)));
            assert_eq!(code(&store, "WELCOME10").await.used, 1);

            let retry = redeem(&store, mode, Some("alice-sid"), "WELCOME10").await.unwrap();
            assert_eq!(retry.error_code(), Some(ALREADY_REDEEMED));
            assert_eq!(user(&store, "alice").await.get_path("credits.free"), Some(&json!(10)));
            assert_eq!(code(&store, "WELCOME10").await.used, 1);
        }
    }

    #[tokio::test]
    async fn test_no_such_code() {
        let store = seeded_store().await;
        let result = redeem(&store, RedemptionMode::Relaxed, Some("bob-sid"), "NOPE").await.unwrap();
        assert_eq!(result.error_code(), Some(NO_SUCH_CODE));
    }

    #[tokio::test]
    async fn test_capacity_is_respected() {
        for mode in [RedemptionMode::Relaxed, RedemptionMode::Atomic] {
            let store = seeded_store().await;
            store
                .insert("creditCodes", CreditCode::new("ONCE", 3, 1).to_document().unwrap())
                .await
                .unwrap();

            assert!(redeem(&store, mode, Some("bob-sid"), "ONCE").await.unwrap().is_success());

            for session in ["alice-sid", "admin-sid"] {
                let result = redeem(&store, mode, Some(session), "ONCE").await.unwrap();
                assert_eq!(result.error_code(), Some(MAXIMUM_REACHED));
            }
            let once = code(&store, "ONCE").await;
            assert_eq!(once.used, once.total);
            assert_eq!(user(&store, "alice").await.get_path("credits.free"), Some(&json!(0)));
        }
    }

    #[tokio::test]
    async fn test_atomic_mode_rolls_back_lost_race() {
        let store = seeded_store().await;
        // The capacity check passes on the stale read, then the counter is bumped
        // behind the method's back before its conditional increment.
        struct Racing {
            inner: Arc<dyn Store>,
        }
        #[async_trait]
        impl Store for Racing {
            async fn find(&self, c: &str, f: &Filter, o: &pubsync_core::FindOptions) -> std::result::Result<Vec<Document>, pubsync_storage::StoreError> {
                self.inner.find(c, f, o).await
            }
            async fn find_one(&self, c: &str, f: &Filter) -> std::result::Result<Option<Document>, pubsync_storage::StoreError> {
                self.inner.find_one(c, f).await
            }
            async fn update_one(&self, c: &str, f: &Filter, u: &Update) -> std::result::Result<pubsync_storage::UpdateOutcome, pubsync_storage::StoreError> {
                if c == CREDIT_CODES_COLLECTION && u.ops().iter().any(|op| op.path() == "used") {
                    self.inner
                        .update_one(c, &Filter::new().eq("name", "LAST"), &Update::new().inc("used", 1))
                        .await?;
                }
                self.inner.update_one(c, f, u).await
            }
            async fn insert(&self, c: &str, d: Document) -> std::result::Result<Document, pubsync_storage::StoreError> {
                self.inner.insert(c, d).await
            }
            async fn remove(&self, c: &str, f: &Filter) -> std::result::Result<bool, pubsync_storage::StoreError> {
                self.inner.remove(c, f).await
            }
            async fn stats(&self) -> std::result::Result<pubsync_storage::StoreStats, pubsync_storage::StoreError> {
                self.inner.stats().await
            }
        }

        store
            .insert("creditCodes", CreditCode::new("LAST", 4, 1).to_document().unwrap())
            .await
            .unwrap();
        let racing: Arc<dyn Store> = Arc::new(Racing { inner: store.clone() });

        let result = redeem(&racing, RedemptionMode::Atomic, Some("bob-sid"), "LAST").await.unwrap();
        assert_eq!(result.error_code(), Some(MAXIMUM_REACHED));

        let bob = user(&store, "bob").await;
        assert_eq!(bob.get_path("credits.free"), Some(&json!(1)));
        assert_eq!(bob.get(REDEEMED_FIELD), Some(&json!([])));
        assert_eq!(code(&store, "LAST").await.used, 1);
    }

    #[tokio::test]
    async fn test_anonymous_caller_is_a_hard_failure() {
        let store = seeded_store().await;
        let result = redeem(&store, RedemptionMode::Relaxed, None, "WELCOME10").await;
        assert!(matches!(result, Err(Error::NotAuthenticated(_))));
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let store = seeded_store().await;
        let ctx = context_for(Some("bob-sid"), WatermarkMap::new());
        let result = RedeemCreditCode::new(RedemptionMode::Relaxed)
            .call(store.as_ref(), &json!({"code": 1}), &ctx)
            .await;
        assert!(matches!(result, Err(Error::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_missing_user_record() {
        let store = seeded_store().await;
        store.remove("users", &Filter::new().eq("_id", "bob")).await.unwrap();
        let result = redeem(&store, RedemptionMode::Relaxed, Some("bob-sid"), "WELCOME10").await;
        assert!(matches!(result, Err(Error::MissingRecord { .. })));
    }

    #[test]
    fn test_redemption_mode_parsing() {
        assert_eq!("atomic".parse::<RedemptionMode>(), Ok(RedemptionMode::Atomic));
        assert_eq!("Relaxed".parse::<RedemptionMode>(), Ok(RedemptionMode::Relaxed));
        assert!("strict".parse::<RedemptionMode>().is_err());
    }
}
