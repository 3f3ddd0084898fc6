//! Reusable publication policies
//!
//! Query policies are watermark-aware: when the client has a marker for the
//! collection, only documents modified after it are returned.

use crate::context::{own_record, RequestContext};
use crate::publication::{Options, Publication, PublicationOutcome};
use async_trait::async_trait;
use pubsync_core::{DiffResult, Filter, FindOptions, Marker, Projection, Result, SortOrder, ID_FIELD, UPDATED_AT_FIELD};
use pubsync_storage::Store;
use std::time::Duration;
use tracing::debug;

/// Only documents changed since the caller's watermark for `collection`
fn since_watermark(ctx: &RequestContext, collection: &str) -> Filter {
    match ctx.watermarks.get(collection) {
        Some(marker) => Filter::new().gt(UPDATED_AT_FIELD, marker.as_millis()),
        None => Filter::new(),
    }
}

/// Rolling time horizon for "recent" publications
#[derive(Debug, Clone, PartialEq)]
pub struct RecentWindow {
    /// Millisecond timestamp field compared against the horizon
    pub field: String,
    pub horizon: Duration,
    pub limit: usize,
}

impl RecentWindow {
    pub fn new(field: impl Into<String>, horizon: Duration, limit: usize) -> Self {
        Self {
            field: field.into(),
            horizon,
            limit,
        }
    }

    fn filter(&self, now: Marker) -> Filter {
        let cutoff = now.saturating_sub(self.horizon.as_millis() as i64);
        Filter::new().gt(self.field.as_str(), cutoff.as_millis())
    }

    fn options(&self) -> FindOptions {
        FindOptions::new()
            .sort(UPDATED_AT_FIELD, SortOrder::Asc)
            .limit(self.limit)
    }
}

/// Open read: no identity check
pub struct OpenRead {
    collection: String,
    filter: Filter,
    window: Option<RecentWindow>,
}

impl OpenRead {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: Filter::new(),
            window: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Bound the query to recently created documents
    pub fn recent(mut self, window: RecentWindow) -> Self {
        self.window = Some(window);
        self
    }
}

#[async_trait]
impl Publication for OpenRead {
    async fn publish(&self, store: &dyn Store, _: &Options, ctx: &RequestContext) -> Result<PublicationOutcome> {
        let mut filter = self.filter.clone().and(since_watermark(ctx, &self.collection));
        let mut options = FindOptions::new();
        if let Some(window) = &self.window {
            filter = filter.and(window.filter(Marker::now()));
            options = window.options();
        }

        let docs = store.find(&self.collection, &filter, &options).await?;
        Ok(PublicationOutcome::from_query(&self.collection, docs))
    }
}

/// Identity-scoped read: the caller's own documents, nothing for anonymous callers
pub struct IdentityScoped {
    collection: String,
    owner_field: String,
}

impl IdentityScoped {
    pub fn new(collection: impl Into<String>, owner_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            owner_field: owner_field.into(),
        }
    }
}

#[async_trait]
impl Publication for IdentityScoped {
    async fn publish(&self, store: &dyn Store, _: &Options, ctx: &RequestContext) -> Result<PublicationOutcome> {
        let uid = match ctx.auth.user_id().await? {
            Some(uid) => uid,
            None => return Ok(PublicationOutcome::Denied),
        };

        let filter = Filter::new()
            .eq(self.owner_field.as_str(), uid.as_str())
            .and(since_watermark(ctx, &self.collection));
        let docs = store.find(&self.collection, &filter, &FindOptions::new()).await?;
        Ok(PublicationOutcome::from_query(&self.collection, docs))
    }
}

/// Privilege-scoped read: only for callers whose user record is flagged admin
pub struct PrivilegeScoped {
    collection: String,
    exclude_self: bool,
    projection: Option<Projection>,
    strip: Vec<String>,
}

impl PrivilegeScoped {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            exclude_self: false,
            projection: None,
            strip: Vec::new(),
        }
    }

    /// Leave the caller's own record out of the result
    pub fn exclude_self(mut self) -> Self {
        self.exclude_self = true;
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Fields removed from every entry, whatever the projection says
    pub fn strip<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Publication for PrivilegeScoped {
    async fn publish(&self, store: &dyn Store, _: &Options, ctx: &RequestContext) -> Result<PublicationOutcome> {
        let uid = match ctx.auth.user_id().await? {
            Some(uid) => uid,
            None => return Ok(PublicationOutcome::Denied),
        };
        if !ctx.auth.is_privileged(store).await? {
            debug!(user = %uid, collection = %self.collection, "Privilege required");
            return Ok(PublicationOutcome::Denied);
        }

        let mut filter = since_watermark(ctx, &self.collection);
        if self.exclude_self {
            filter = filter.ne(ID_FIELD, uid.as_str());
        }
        let mut options = FindOptions::new();
        if let Some(projection) = &self.projection {
            options = options.project(projection.clone());
        }

        let mut docs = store.find(&self.collection, &filter, &options).await?;
        for doc in &mut docs {
            doc.strip(&self.strip);
        }
        Ok(PublicationOutcome::from_query(&self.collection, docs))
    }
}

/// The caller's own record, re-sent only when it changed
pub struct OwnRecord {
    collection: String,
    strip: Vec<String>,
}

impl OwnRecord {
    /// `strip` lists the credential fields that never leave the server
    pub fn new<I, S>(collection: impl Into<String>, strip: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collection: collection.into(),
            strip: strip.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Publication for OwnRecord {
    async fn publish(&self, store: &dyn Store, _: &Options, ctx: &RequestContext) -> Result<PublicationOutcome> {
        let uid = match ctx.auth.user_id().await? {
            Some(uid) => uid,
            None => return Ok(PublicationOutcome::Denied),
        };

        let mut record = match store.find_one(&self.collection, &own_record(&uid)).await? {
            Some(record) => record,
            None => return Ok(PublicationOutcome::Denied),
        };

        if let Some(marker) = record.updated_at() {
            if ctx.watermarks.has_seen(&self.collection, marker) {
                return Ok(PublicationOutcome::Unchanged);
            }
        }

        record.strip(&self.strip);
        Ok(PublicationOutcome::Changed(DiffResult::single(&self.collection, vec![record])))
    }
}
