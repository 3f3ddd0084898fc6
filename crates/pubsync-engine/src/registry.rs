//! Process-wide registry of publications, methods and access rules
//!
//! Built once at startup with [`RegistryBuilder`], then shared read-only
//! (typically behind an `Arc`). There is no way to register after `build`.

use crate::access::{AccessControl, EvaluatorContext, Operation, Rule};
use crate::context::RequestContext;
use crate::method::{Method, MethodEngine};
use crate::mutation::{self, ChangeOutcome};
use crate::publication::{Options, Publication, PublicationEngine};
use pubsync_core::{DiffResult, MethodResult, Result};
use pubsync_storage::Store;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single publication or method invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RegistryBuilder {
    publications: PublicationEngine,
    methods: MethodEngine,
    access: AccessControl,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            publications: PublicationEngine::new(timeout),
            methods: MethodEngine::new(timeout),
            access: AccessControl::new(),
        }
    }

    pub fn publish(mut self, name: &str, publication: impl Publication + 'static) -> Result<Self> {
        self.publications.register(name, Arc::new(publication))?;
        Ok(self)
    }

    pub fn method(mut self, name: &str, method: impl Method + 'static) -> Result<Self> {
        self.methods.register(name, Arc::new(method))?;
        Ok(self)
    }

    /// Append `rule` to the chain for `(collection, operation)`
    pub fn allow(mut self, collection: &str, operation: Operation, rule: Rule) -> Self {
        self.access.register_rule(collection, operation, rule);
        self
    }

    /// Let privileged callers perform every operation on `collection`
    pub fn allow_privileged(mut self, collection: &str) -> Self {
        for operation in Operation::ALL {
            self.access.register_rule(collection, operation, Rule::Privileged);
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            publications: self.publications,
            methods: self.methods,
            access: self.access,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Registry {
    publications: PublicationEngine,
    methods: MethodEngine,
    access: AccessControl,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn publications(&self) -> &PublicationEngine {
        &self.publications
    }

    pub fn methods(&self) -> &MethodEngine {
        &self.methods
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub async fn subscribe(
        &self,
        store: &dyn Store,
        name: &str,
        options: &Options,
        ctx: &RequestContext,
    ) -> Result<DiffResult> {
        self.publications.invoke(store, name, options, ctx).await
    }

    pub async fn call(
        &self,
        store: &dyn Store,
        name: &str,
        args: &Value,
        ctx: &RequestContext,
    ) -> Result<MethodResult> {
        self.methods.invoke(store, name, args, ctx).await
    }

    pub async fn apply_change(
        &self,
        store: &dyn Store,
        collection: &str,
        operation: Operation,
        raw: &Value,
        ctx: &EvaluatorContext,
    ) -> Result<ChangeOutcome> {
        mutation::commit(&self.access, store, collection, operation, raw, ctx).await
    }
}
