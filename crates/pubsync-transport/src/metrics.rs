//! Prometheus metrics for pubsync
//!
//! Exposed in Prometheus text format over a minimal HTTP endpoint.
//! Labels carry outcome codes only, never client-supplied names.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

/// pubsync metrics collector
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub connections_total: IntCounter,
    pub connections_active: IntGauge,

    pub polls_total: IntCounter,
    pub poll_duration_seconds: Histogram,

    /// Subscription results by outcome: delivered, empty, failed
    pub subscriptions_total: IntCounterVec,
    /// Method results by code
    pub methods_total: IntCounterVec,
    /// Change-set entries by outcome code
    pub changes_total: IntCounterVec,

    pub rate_limited_requests: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total =
            IntCounter::new("pubsync_connections_total", "Total number of connections")?;
        let connections_active =
            IntGauge::new("pubsync_connections_active", "Number of active connections")?;

        let polls_total = IntCounter::new("pubsync_polls_total", "Total polls processed")?;
        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("pubsync_poll_duration_seconds", "Poll processing duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        let subscriptions_total = IntCounterVec::new(
            Opts::new("pubsync_subscriptions_total", "Subscription results by outcome"),
            &["outcome"],
        )?;
        let methods_total = IntCounterVec::new(
            Opts::new("pubsync_methods_total", "Method results by code"),
            &["code"],
        )?;
        let changes_total = IntCounterVec::new(
            Opts::new("pubsync_changes_total", "Change-set entries by outcome"),
            &["outcome"],
        )?;

        let rate_limited_requests = IntCounter::new(
            "pubsync_rate_limited_requests_total",
            "Total requests rejected due to rate limiting",
        )?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_duration_seconds.clone()))?;
        registry.register(Box::new(subscriptions_total.clone()))?;
        registry.register(Box::new(methods_total.clone()))?;
        registry.register(Box::new(changes_total.clone()))?;
        registry.register(Box::new(rate_limited_requests.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            polls_total,
            poll_duration_seconds,
            subscriptions_total,
            methods_total,
            changes_total,
            rate_limited_requests,
        })
    }

    pub fn record_connection(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    pub fn record_disconnection(&self) {
        self.connections_active.dec();
    }

    pub fn record_poll(&self, elapsed: Duration) {
        self.polls_total.inc();
        self.poll_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_subscription(&self, outcome: &str) {
        self.subscriptions_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_method(&self, code: &str) {
        self.methods_total.with_label_values(&[code]).inc();
    }

    pub fn record_change(&self, outcome: &str) {
        self.changes_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_requests.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// HTTP server for the metrics endpoint
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Metrics server listening on http://{}/metrics", self.addr);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::respond(stream, &metrics).await {
                            error!(error = %e, "Metrics request failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept metrics connection");
                }
            }
        }
    }

    async fn respond(mut stream: TcpStream, metrics: &Metrics) -> std::io::Result<()> {
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let request = String::from_utf8_lossy(&buf[..n]);
        let (status, content_type, body) =
            if request.starts_with("GET /metrics") || request.starts_with("GET / ") {
                ("200 OK", "text/plain; version=0.0.4; charset=utf-8", metrics.export())
            } else if request.starts_with("GET /health") {
                ("200 OK", "text/plain", "OK".to_string())
            } else {
                ("404 Not Found", "text/plain", String::new())
            };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await
    }
}
