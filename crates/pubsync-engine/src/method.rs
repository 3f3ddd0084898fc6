//! Method registry and invocation

use crate::context::RequestContext;
use async_trait::async_trait;
use pubsync_core::{Error, MethodResult, Result};
use pubsync_storage::Store;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A named remote procedure
///
/// Expected failures are returned as [`MethodResult::Error`]. `Err` is
/// reserved for programmer errors, missing identity on an authenticated
/// method, and store failures.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, store: &dyn Store, args: &Value, ctx: &RequestContext) -> Result<MethodResult>;
}

/// Registry of methods
pub struct MethodEngine {
    handlers: HashMap<String, Arc<dyn Method>>,
    timeout: Duration,
}

impl MethodEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Method>) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateRegistration { kind: "method", name });
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

    pub async fn invoke(
        &self,
        store: &dyn Store,
        name: &str,
        args: &Value,
        ctx: &RequestContext,
    ) -> Result<MethodResult> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::UnknownMethod(name.to_string()))?;

        let result = tokio::time::timeout(self.timeout, handler.call(store, args, ctx))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("method {}", name),
                after_ms: self.timeout.as_millis() as u64,
            })?;

        match &result {
            Ok(MethodResult::Success(_)) => debug!(method = name, "Method succeeded"),
            Ok(MethodResult::Error(code)) => debug!(method = name, code = %code, "Method returned error"),
            Err(e) => warn!(method = name, error = %e, "Method failed"),
        }
        result
    }
}
