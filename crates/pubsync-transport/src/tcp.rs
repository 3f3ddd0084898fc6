//! TCP transport for pubsync

use crate::handler::ConnectionHandler;
use crate::poller::Poller;
use crate::rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// TCP server speaking newline-delimited JSON polls
pub struct TcpServer {
    poller: Arc<Poller>,
    addr: SocketAddr,
    client_counter: AtomicU64,
    rate_limit: Option<RateLimitConfig>,
}

impl TcpServer {
    pub fn new(poller: Arc<Poller>, addr: SocketAddr) -> Self {
        Self {
            poller,
            addr,
            client_counter: AtomicU64::new(0),
            rate_limit: None,
        }
    }

    /// Rate limit every connection independently
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Bind and serve until the task is dropped
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "pubsync TCP server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = format!(
                        "tcp:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    );

                    let mut handler = ConnectionHandler::new(client_id.clone(), self.poller.clone());
                    if let Some(config) = self.rate_limit {
                        handler = handler.with_rate_limit(config);
                    }

                    #[cfg(feature = "metrics")]
                    let poller = self.poller.clone();

                    tokio::spawn(async move {
                        #[cfg(feature = "metrics")]
                        poller.observe(|m| m.record_connection());

                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            error!(client = %client_id, error = %e, "Connection error");
                        }

                        #[cfg(feature = "metrics")]
                        poller.observe(|m| m.record_disconnection());
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        mut handler: ConnectionHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(client = %handler.client_id, "Client connected");
        let mut buf = vec![0u8; 4096];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                info!(client = %handler.client_id, "Client disconnected");
                return Ok(());
            }

            for response in handler.process(&buf[..n]).await {
                stream.write_all(&response.encode()).await?;
            }
            debug!(client = %handler.client_id, bytes = n, "Processed input");
        }
    }
}
