//! pubsync Transport Layer
//!
//! - Poller: runs one poll (change set, methods, subscriptions) against the registry
//! - TCP: newline-delimited JSON polls
//! - Rate limiting: token bucket per connection
//! - Metrics: Prometheus metrics (optional feature)

pub mod handler;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod poller;
pub mod rate_limit;
pub mod tcp;

pub use handler::ConnectionHandler;
#[cfg(feature = "metrics")]
pub use metrics::{Metrics, MetricsServer};
pub use poller::{Poller, INTERNAL_ERROR};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use tcp::TcpServer;
