//! Shared fixtures for engine tests

use crate::context::{Auth, Credentials, IdentityResolver, RequestContext};
use async_trait::async_trait;
use pubsync_core::{Document, Filter, FindOptions, Result, Update, UserId, WatermarkMap};
use pubsync_storage::{MemoryStore, Store, StoreError, StoreStats, UpdateOutcome};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;

/// Resolver backed by a fixed session table that counts lookups
pub struct CountingResolver {
    sessions: HashMap<String, UserId>,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(sessions: &[(&str, &str)]) -> Self {
        Self {
            sessions: sessions
                .iter()
                .map(|(sid, uid)| (sid.to_string(), UserId::new(*uid)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for CountingResolver {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<UserId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(credentials
            .session_id
            .as_ref()
            .and_then(|sid| self.sessions.get(sid))
            .cloned())
    }
}

/// Sessions used across the engine tests
pub const SESSIONS: &[(&str, &str)] = &[("admin-sid", "admin"), ("bob-sid", "bob"), ("alice-sid", "alice")];

pub fn context_for(session: Option<&str>, watermarks: WatermarkMap) -> RequestContext {
    let credentials = session.map_or_else(Credentials::anonymous, Credentials::session);
    let auth = Auth::new(Arc::new(CountingResolver::new(SESSIONS)), credentials);
    RequestContext::new(Arc::new(auth), watermarks)
}

pub fn doc(value: serde_json::Value) -> Document {
    Document::from_value(value).expect("fixture must be an object")
}

/// Store with three users, a few orders and one credit code
pub async fn seeded_store() -> Arc<dyn Store> {
    let store = MemoryStore::new();
    let fixtures = [
        ("users", json!({"_id": "admin", "admin": true, "displayName": "Admin", "password": "x", "credits": {"free": 0}})),
        ("users", json!({"_id": "bob", "displayName": "Bob", "emails": ["bob@example.com"], "password": "hunter2", "services": {"google": {}}, "credits": {"free": 1}})),
        ("users", json!({"_id": "alice", "displayName": "Alice", "credits": {"free": 0}})),
        ("orders", json!({"_id": "o1", "userId": "bob", "total": 5})),
        ("orders", json!({"_id": "o2", "userId": "alice", "total": 7})),
        ("orders", json!({"_id": "o3", "userId": "bob", "total": 9})),
        ("creditCodes", json!({"_id": "c1", "name": "WELCOME10", "credits": 10, "used": 0, "total": 5})),
    ];
    for (collection, value) in fixtures {
        store.insert(collection, doc(value)).await.expect("seed insert");
    }
    Arc::new(store)
}

/// Store wrapper recording every `find`/`find_one` call
pub struct RecordingStore {
    inner: Arc<dyn Store>,
    pub queries: Mutex<Vec<(String, Filter)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queried(&self, collection: &str) -> bool {
        self.queries
            .lock()
            .iter()
            .any(|(c, _)| c == collection)
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> std::result::Result<Vec<Document>, StoreError> {
        self.queries.lock().push((collection.to_string(), filter.clone()));
        self.inner.find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> std::result::Result<Option<Document>, StoreError> {
        self.queries.lock().push((collection.to_string(), filter.clone()));
        self.inner.find_one(collection, filter).await
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> std::result::Result<UpdateOutcome, StoreError> {
        self.inner.update_one(collection, filter, update).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> std::result::Result<Document, StoreError> {
        self.inner.insert(collection, doc).await
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> std::result::Result<bool, StoreError> {
        self.inner.remove(collection, filter).await
    }

    async fn stats(&self) -> std::result::Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}

/// Store that is always down
pub struct UnavailableStore;

#[async_trait]
impl Store for UnavailableStore {
    async fn find(&self, _: &str, _: &Filter, _: &FindOptions) -> std::result::Result<Vec<Document>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find_one(&self, _: &str, _: &Filter) -> std::result::Result<Option<Document>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn update_one(&self, _: &str, _: &Filter, _: &Update) -> std::result::Result<UpdateOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn insert(&self, _: &str, _: Document) -> std::result::Result<Document, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn remove(&self, _: &str, _: &Filter) -> std::result::Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn stats(&self) -> std::result::Result<StoreStats, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}
