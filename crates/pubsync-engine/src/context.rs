//! Request context and identity resolution

use async_trait::async_trait;
use pubsync_core::{Document, Filter, Identity, Result, UserId, WatermarkMap};
use pubsync_storage::Store;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Collection holding user records
pub const USERS_COLLECTION: &str = "users";

/// Collection mapping session ids to users
pub const SESSIONS_COLLECTION: &str = "sessions";

/// User field marking privileged (administrator) accounts
pub const ADMIN_FIELD: &str = "admin";

/// Credentials presented with a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub session_id: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self {
            session_id: Some(id.into()),
        }
    }
}

/// Resolves credentials to a user, or `None` for anonymous callers
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<UserId>>;
}

/// Looks session ids up in the `sessions` collection (`{_id, userId}`)
pub struct SessionResolver {
    store: Arc<dyn Store>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityResolver for SessionResolver {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<UserId>> {
        let sid = match &credentials.session_id {
            Some(sid) if !sid.is_empty() => sid,
            _ => return Ok(None),
        };

        let session = self
            .store
            .find_one(SESSIONS_COLLECTION, &Filter::new().eq("_id", sid.as_str()))
            .await?;

        Ok(session
            .as_ref()
            .and_then(|s| s.get("userId"))
            .and_then(Value::as_str)
            .map(UserId::new))
    }
}

/// Per-request authentication handle
///
/// Identity and privilege are resolved lazily and at most once per request,
/// so handlers that never ask never touch the resolver or the store.
pub struct Auth {
    resolver: Arc<dyn IdentityResolver>,
    credentials: Credentials,
    user: OnceCell<Option<UserId>>,
    privileged: OnceCell<bool>,
}

impl Auth {
    pub fn new(resolver: Arc<dyn IdentityResolver>, credentials: Credentials) -> Self {
        Self {
            resolver,
            credentials,
            user: OnceCell::new(),
            privileged: OnceCell::new(),
        }
    }

    /// The caller's user id, or `None` when anonymous
    pub async fn user_id(&self) -> Result<Option<UserId>> {
        let user = self
            .user
            .get_or_try_init(|| self.resolver.resolve(&self.credentials))
            .await?;
        Ok(user.clone())
    }

    pub async fn identity(&self) -> Result<Identity> {
        Ok(Identity::from(self.user_id().await?))
    }

    /// Load the caller's own user record
    pub async fn user_record(&self, store: &dyn Store) -> Result<Option<Document>> {
        match self.user_id().await? {
            Some(uid) => Ok(store.find_one(USERS_COLLECTION, &own_record(&uid)).await?),
            None => Ok(None),
        }
    }

    /// Whether the caller's user record carries `admin: true`
    pub async fn is_privileged(&self, store: &dyn Store) -> Result<bool> {
        let privileged = self
            .privileged
            .get_or_try_init(|| async {
                let admin = self
                    .user_record(store)
                    .await?
                    .map_or(false, |user| user.get(ADMIN_FIELD) == Some(&Value::Bool(true)));
                debug!(identity = ?self.user.get(), admin, "Resolved privilege");
                Ok::<_, pubsync_core::Error>(admin)
            })
            .await?;
        Ok(*privileged)
    }
}

/// Filter selecting a user's own record
pub fn own_record(uid: &UserId) -> Filter {
    Filter::new().eq("_id", uid.as_str())
}

/// Everything a handler may consult about the caller
pub struct RequestContext {
    pub auth: Arc<Auth>,
    pub watermarks: WatermarkMap,
}

impl RequestContext {
    pub fn new(auth: Arc<Auth>, watermarks: WatermarkMap) -> Self {
        Self { auth, watermarks }
    }
}
