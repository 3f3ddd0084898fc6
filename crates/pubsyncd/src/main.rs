//! pubsync Daemon (pubsyncd)
//!
//! Serves the credit-domain publications and methods over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (TCP on 7070)
//! pubsyncd
//!
//! # With configuration file
//! pubsyncd --config /etc/pubsync/pubsync.toml
//!
//! # Rate limiting, metrics and an admin account
//! pubsyncd --rate-limit 20 --metrics-port 9090 --admin root
//! ```

mod config;
mod seed;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use pubsync_engine::{domain, RedemptionMode, RegistryBuilder, SessionResolver};
use pubsync_storage::{MemoryStore, Store};
use pubsync_transport::{Metrics, MetricsServer, Poller, RateLimitConfig, TcpServer};

use crate::config::Config;

/// pubsync Daemon
#[derive(Parser, Debug)]
#[command(name = "pubsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "PUBSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "PUBSYNC_BIND")]
    bind: Option<String>,

    /// TCP port to listen on
    #[arg(long, env = "PUBSYNC_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PUBSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Rate limit: max polls per second per connection (0 = disabled)
    #[arg(long, env = "PUBSYNC_RATE_LIMIT")]
    rate_limit: Option<u32>,

    /// Rate limit burst size (default: 2x rate limit)
    #[arg(long, env = "PUBSYNC_RATE_BURST")]
    rate_burst: Option<u32>,

    /// Bound on a single publication or method invocation, in milliseconds
    #[arg(long, env = "PUBSYNC_STORE_TIMEOUT_MS")]
    store_timeout_ms: Option<u64>,

    /// Horizon of the time-windowed publications, in hours
    #[arg(long, env = "PUBSYNC_RECENT_HORIZON_HOURS")]
    recent_horizon_hours: Option<u64>,

    /// Row limit of the time-windowed publications
    #[arg(long, env = "PUBSYNC_RECENT_LIMIT")]
    recent_limit: Option<usize>,

    /// Credit code redemption mode (relaxed, atomic)
    #[arg(long, env = "PUBSYNC_REDEMPTION")]
    redemption: Option<RedemptionMode>,

    /// User id to mark as admin at startup (repeatable)
    #[arg(long = "admin", env = "PUBSYNC_ADMINS", value_delimiter = ',')]
    admins: Vec<String>,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, env = "PUBSYNC_METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    /// Overlay flags on top of the file configuration
    fn apply(self, mut config: Config) -> Config {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = level;
        }
        if self.metrics_port.is_some() {
            config.server.metrics_port = self.metrics_port;
        }
        if let Some(rate) = self.rate_limit {
            config.limits.rate_limit = rate;
        }
        if self.rate_burst.is_some() {
            config.limits.rate_burst = self.rate_burst;
        }
        if let Some(timeout) = self.store_timeout_ms {
            config.limits.store_timeout_ms = timeout;
        }
        if let Some(hours) = self.recent_horizon_hours {
            config.publications.recent_horizon_hours = hours;
        }
        if let Some(limit) = self.recent_limit {
            config.publications.recent_limit = limit;
        }
        if let Some(mode) = self.redemption {
            config.methods.redemption = mode;
        }
        for admin in self.admins {
            if !config.access.admins.contains(&admin) {
                config.access.admins.push(admin);
            }
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = args.apply(file);

    // Initialize logging
    let level = match config.server.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed::seed(store.as_ref(), &config).await?;

    let settings = config.domain_settings();
    let registry = domain::install(RegistryBuilder::with_timeout(config.store_timeout()), &settings)?.build();
    info!(
        publications = ?registry.publications().names(),
        methods = ?registry.methods().names(),
        guarded = ?registry.access().guarded_collections(),
        redemption = ?settings.redemption,
        "Registry built"
    );

    let resolver = Arc::new(SessionResolver::new(store.clone()));
    let mut poller = Poller::new(Arc::new(registry), store, resolver);

    let mut handles = Vec::new();

    if let Some(port) = config.server.metrics_port {
        let metrics = Arc::new(Metrics::new()?);
        poller = poller.with_metrics(metrics.clone());

        let metrics_addr: SocketAddr = format!("{}:{}", config.server.bind, port).parse()?;
        let metrics_server = MetricsServer::new(metrics, metrics_addr);
        handles.push(tokio::spawn(async move {
            if let Err(e) = metrics_server.run().await {
                error!(error = %e, "Metrics server error");
            }
        }));
    }

    let tcp_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let mut tcp_server = TcpServer::new(Arc::new(poller), tcp_addr);
    if config.limits.rate_limit > 0 {
        let rate = config.limits.rate_limit;
        let burst = config.limits.rate_burst.unwrap_or(rate.saturating_mul(2));
        info!(rate, burst, "Rate limiting enabled");
        tcp_server = tcp_server.with_rate_limit(RateLimitConfig::new(rate, burst));
    }

    info!(
        addr = %tcp_addr,
        metrics_port = ?config.server.metrics_port,
        "Starting pubsync daemon"
    );

    handles.push(tokio::spawn(async move {
        if let Err(e) = tcp_server.run().await {
            error!(error = %e, "TCP server error");
        }
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  pubsync
  Publications, methods and access rules over one poll
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let file = Config::parse(
            r#"
            [server]
            port = 9000
            [access]
            admins = ["root"]
            "#,
        )
        .unwrap();

        let args = Args::parse_from([
            "pubsyncd",
            "--port",
            "7100",
            "--redemption",
            "atomic",
            "--admin",
            "root,ops",
        ]);
        let config = args.apply(file);

        assert_eq!(config.server.port, 7100);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.methods.redemption, RedemptionMode::Atomic);
        assert_eq!(config.access.admins, vec!["root", "ops"]);
    }

    #[test]
    fn test_args_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
