//! Publication registry and invocation

use crate::context::RequestContext;
use async_trait::async_trait;
use pubsync_core::{DiffResult, Document, Error, Result};
use pubsync_storage::Store;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client-supplied publication options
pub type Options = Map<String, Value>;

/// What a publication handler produced
///
/// `Denied` and `Unchanged` stay distinct inside the engine for logging and
/// tests, but both leave the engine as an empty [`DiffResult`] so a client
/// cannot tell a refusal from an idle poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicationOutcome {
    Denied,
    Unchanged,
    /// Bare documents, attributed to a collection named after the publication
    Entries(Vec<Document>),
    Changed(DiffResult),
}

impl PublicationOutcome {
    /// Wrap query results, reporting `Unchanged` when nothing matched
    pub fn from_query(collection: &str, docs: Vec<Document>) -> Self {
        if docs.is_empty() {
            PublicationOutcome::Unchanged
        } else {
            PublicationOutcome::Changed(DiffResult::single(collection, docs))
        }
    }

    fn into_diff(self, publication: &str) -> DiffResult {
        match self {
            PublicationOutcome::Denied => {
                debug!(publication, "Publication denied");
                DiffResult::empty()
            }
            PublicationOutcome::Unchanged => {
                debug!(publication, "Publication unchanged");
                DiffResult::empty()
            }
            PublicationOutcome::Entries(entries) => DiffResult::single(publication, entries),
            PublicationOutcome::Changed(diff) => diff.into_inner().into_iter().collect(),
        }
    }
}

/// A named read subscription
#[async_trait]
pub trait Publication: Send + Sync {
    async fn publish(
        &self,
        store: &dyn Store,
        options: &Options,
        ctx: &RequestContext,
    ) -> Result<PublicationOutcome>;
}

/// Registry of publications
pub struct PublicationEngine {
    handlers: HashMap<String, Arc<dyn Publication>>,
    timeout: Duration,
}

impl PublicationEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Publication>) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateRegistration {
                kind: "publication",
                name,
            });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run a publication and return only what the caller has not seen
    ///
    /// Unknown names, store failures and timeouts are hard errors; denial
    /// and "nothing new" are both an empty result.
    pub async fn invoke(
        &self,
        store: &dyn Store,
        name: &str,
        options: &Options,
        ctx: &RequestContext,
    ) -> Result<DiffResult> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::UnknownPublication(name.to_string()))?;

        let outcome = tokio::time::timeout(self.timeout, handler.publish(store, options, ctx))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("publication {}", name),
                after_ms: self.timeout.as_millis() as u64,
            })??;

        let diff = outcome.into_diff(name);
        debug!(
            publication = name,
            collections = diff.len(),
            entries = diff.entry_count(),
            "Publication invoked"
        );
        Ok(diff)
    }
}
