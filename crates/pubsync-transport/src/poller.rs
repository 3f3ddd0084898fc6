//! Poll dispatch
//!
//! One poll runs its change set first, then its method calls in order, then
//! all subscriptions concurrently. Hard failures are reported per entry with
//! a generic code and logged; their details never reach the client.

use futures_util::future::join_all;
use pubsync_core::WatermarkMap;
use pubsync_engine::{
    evaluator_context, Auth, Credentials, EvaluatorContext, IdentityResolver, Operation, Registry,
    RequestContext,
};
use pubsync_protocol::{
    ChangeResults, CollectionChanges, MethodCall, MethodReturn, PollRequest, PollResponse,
    SubResult, SubscriptionRequest,
};
use pubsync_storage::Store;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;

/// Generic code for an entry that failed for reasons the client cannot act on
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Runs polls against a registry and store
pub struct Poller {
    registry: Arc<Registry>,
    store: Arc<dyn Store>,
    resolver: Arc<dyn IdentityResolver>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl Poller {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn Store>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn observe(&self, record: impl FnOnce(&Metrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    pub async fn poll(&self, request: PollRequest) -> PollResponse {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let credentials = match request.session_id() {
            Some(sid) => Credentials::session(sid),
            None => Credentials::anonymous(),
        };
        let auth = Arc::new(Auth::new(self.resolver.clone(), credentials));

        let mut response = PollResponse::default();

        if !request.change_set.is_empty() {
            response.change_set_results = self.apply_change_set(&auth, &request.change_set).await;
        }

        for call in &request.methods {
            let result = self.call_method(&auth, call).await;
            response.methods_results.push(result);
        }

        let subscriptions = request
            .subscriptions
            .iter()
            .map(|subscription| self.subscribe(&auth, subscription));
        response.sub_results = join_all(subscriptions).await;

        #[cfg(feature = "metrics")]
        self.observe(|m| m.record_poll(started.elapsed()));

        response
    }

    async fn apply_change_set(
        &self,
        auth: &Auth,
        change_set: &BTreeMap<String, CollectionChanges>,
    ) -> BTreeMap<String, ChangeResults> {
        // Identity and privilege are resolved once for the whole change set
        let ctx = match evaluator_context(auth, self.store.as_ref()).await {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                error!(error = %e, "Failed to resolve caller for change set");
                None
            }
        };

        let mut results = BTreeMap::new();
        for (collection, changes) in change_set {
            let outcome = ChangeResults {
                insert: self
                    .apply_each(ctx.as_ref(), collection, Operation::Insert, &changes.insert)
                    .await,
                update: self
                    .apply_each(ctx.as_ref(), collection, Operation::Update, &changes.update)
                    .await,
                delete: self
                    .apply_each(ctx.as_ref(), collection, Operation::Remove, &changes.delete)
                    .await,
            };
            results.insert(collection.clone(), outcome);
        }
        results
    }

    async fn apply_each(
        &self,
        ctx: Option<&EvaluatorContext>,
        collection: &str,
        operation: Operation,
        entries: &[Value],
    ) -> Vec<String> {
        let mut codes = Vec::with_capacity(entries.len());

        for raw in entries {
            let code = match ctx {
                None => INTERNAL_ERROR.to_string(),
                Some(ctx) => match self
                    .registry
                    .apply_change(self.store.as_ref(), collection, operation, raw, ctx)
                    .await
                {
                    Ok(outcome) => outcome.code().to_string(),
                    Err(e) => {
                        warn!(collection, %operation, error = %e, "Change failed");
                        INTERNAL_ERROR.to_string()
                    }
                },
            };

            #[cfg(feature = "metrics")]
            self.observe(|m| m.record_change(&code));

            codes.push(code);
        }

        codes
    }

    async fn call_method(&self, auth: &Arc<Auth>, call: &MethodCall) -> MethodReturn {
        let ctx = RequestContext::new(auth.clone(), WatermarkMap::new());

        let result = match self
            .registry
            .call(self.store.as_ref(), &call.name, &call.opts, &ctx)
            .await
        {
            Ok(result) => MethodReturn::result(&call.id, result),
            Err(e) => {
                warn!(method = %call.name, id = %call.id, error = %e, "Method failed");
                MethodReturn::failure(&call.id, INTERNAL_ERROR)
            }
        };

        #[cfg(feature = "metrics")]
        self.observe(|m| {
            let code = match (&result.result, &result.failure) {
                (Some(r), _) => r.error_code().unwrap_or("OK"),
                (None, Some(failure)) => failure.as_str(),
                (None, None) => INTERNAL_ERROR,
            };
            m.record_method(code);
        });

        result
    }

    async fn subscribe(&self, auth: &Arc<Auth>, subscription: &SubscriptionRequest) -> SubResult {
        let ctx = RequestContext::new(auth.clone(), subscription.updated_at.clone());

        let result = match self
            .registry
            .subscribe(self.store.as_ref(), &subscription.name, &subscription.opts, &ctx)
            .await
        {
            Ok(results) => {
                debug!(
                    publication = %subscription.name,
                    entries = results.entry_count(),
                    "Subscription served"
                );
                SubResult::delivered(&subscription.name, results)
            }
            Err(e) => {
                warn!(publication = %subscription.name, error = %e, "Subscription failed");
                SubResult::failed(&subscription.name, INTERNAL_ERROR)
            }
        };

        #[cfg(feature = "metrics")]
        self.observe(|m| {
            m.record_subscription(match (&result.failure, result.results.is_empty()) {
                (Some(_), _) => "failed",
                (None, true) => "empty",
                (None, false) => "delivered",
            })
        });

        result
    }
}
