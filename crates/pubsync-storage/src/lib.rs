//! pubsync Storage
//!
//! The document store is an external collaborator; engines only see the
//! [`Store`] trait. An in-memory backend is provided for development, tests
//! and embedding.

#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use pubsync_core::{Document, Filter, FindOptions, Update};

/// Document store adapter
///
/// Every write stamps the document's `__updatedAt` marker. Operations on
/// different documents are not transactional with respect to each other.
#[async_trait]
pub trait Store: Send + Sync {
    /// Find every document in `collection` matching `filter`
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Find the first document matching `filter`
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError>;

    /// Apply `update` to the first document matching `filter`
    ///
    /// The match and the write happen atomically, so a filter doubles as a
    /// precondition: `matched == 0` means the precondition did not hold.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Insert a document, generating an `_id` when absent. Returns the stored document.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError>;

    /// Remove the first document matching `filter`
    async fn remove(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Result of `update_one`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
}

impl UpdateOutcome {
    pub fn matched(&self) -> bool {
        self.matched > 0
    }
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate document ID in {collection}: {id}")]
    Duplicate { collection: String, id: String },

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<pubsync_core::Error> for StoreError {
    fn from(e: pubsync_core::Error) -> Self {
        StoreError::InvalidUpdate(e.to_string())
    }
}

impl From<StoreError> for pubsync_core::Error {
    fn from(e: StoreError) -> Self {
        pubsync_core::Error::Store(e.to_string())
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub collection_count: usize,
    pub document_count: usize,
}

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
