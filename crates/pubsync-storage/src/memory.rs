//! In-memory storage backend

use crate::{Store, StoreError, StoreStats, UpdateOutcome};
use async_trait::async_trait;
use dashmap::DashMap;
use pubsync_core::{Document, DocumentId, Filter, FindOptions, Marker, Update, ID_FIELD};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::trace;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits. Each collection is guarded by its
/// map shard, so `update_one` matches and writes under one lock.
pub struct MemoryStore {
    /// collection -> (_id -> document)
    collections: DashMap<String, BTreeMap<DocumentId, Document>>,
    /// Last marker handed out; markers are strictly increasing
    clock: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            clock: AtomicI64::new(0),
        }
    }

    /// Next `__updatedAt` marker: wall-clock millis, bumped past the previous one
    fn next_marker(&self) -> Marker {
        let now = Marker::now().as_millis();
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        Marker::new(now.max(prev + 1))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = match self.collections.get(collection) {
            Some(coll) => coll.values().filter(|d| filter.matches(d)).cloned().collect(),
            None => Vec::new(),
        };

        if let Some(sort) = &options.sort {
            docs.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit);
        }
        if let Some(projection) = &options.projection {
            docs = docs.iter().map(|d| projection.apply(d)).collect();
        }

        trace!(collection, found = docs.len(), "find");
        Ok(docs)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|coll| coll.values().find(|d| filter.matches(d)).cloned()))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut coll = match self.collections.get_mut(collection) {
            Some(coll) => coll,
            None => return Ok(UpdateOutcome::default()),
        };

        let (id, current) = match coll.iter().find(|(_, d)| filter.matches(d)) {
            Some((id, doc)) => (id.clone(), doc),
            None => return Ok(UpdateOutcome::default()),
        };

        let mut next = update.apply(current)?;
        next.set_updated_at(self.next_marker());
        coll.insert(id, next);

        Ok(UpdateOutcome { matched: 1 })
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, StoreError> {
        let id = match (doc.get(ID_FIELD), doc.id()) {
            (None, _) => DocumentId::generate(),
            (Some(_), Some(id)) => id,
            (Some(_), None) => {
                return Err(StoreError::InvalidUpdate("_id must be a non-empty string".into()))
            }
        };
        doc.set_id(&id);

        let mut coll = self.collections.entry(collection.to_string()).or_default();
        if coll.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        doc.set_updated_at(self.next_marker());
        coll.insert(id, doc.clone());
        Ok(doc)
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let mut coll = match self.collections.get_mut(collection) {
            Some(coll) => coll,
            None => return Ok(false),
        };

        let id = coll
            .iter()
            .find(|(_, d)| filter.matches(d))
            .map(|(id, _)| id.clone());

        Ok(match id {
            Some(id) => coll.remove(&id).is_some(),
            None => false,
        })
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            collection_count: self.collections.len(),
            document_count: self.collections.iter().map(|c| c.value().len()).sum(),
        })
    }
}
