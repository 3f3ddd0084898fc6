//! Connection handler - frames incoming bytes and answers each poll

use crate::poller::Poller;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use pubsync_protocol::{Frame, Parser, Response};
use std::sync::Arc;
use tracing::debug;

/// Handles a single client connection
pub struct ConnectionHandler {
    /// Unique client ID
    pub client_id: String,
    poller: Arc<Poller>,
    parser: Parser,
    limiter: Option<RateLimiter>,
}

impl ConnectionHandler {
    pub fn new(client_id: String, poller: Arc<Poller>) -> Self {
        Self {
            client_id,
            poller,
            parser: Parser::new(),
            limiter: None,
        }
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.limiter = Some(RateLimiter::new(config));
        self
    }

    /// Process incoming data and return one response per complete line
    pub async fn process(&mut self, data: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();

        if let Err(e) = self.parser.feed(data) {
            debug!(client = %self.client_id, error = %e, "Dropping oversized input");
            self.parser.clear();
            responses.push(Response::error(e.code(), e.to_string()));
            return responses;
        }

        loop {
            match self.parser.parse() {
                Ok(Some(frame)) => {
                    let response = self.handle_frame(frame).await;
                    responses.push(response);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(client = %self.client_id, error = %e, "Bad frame");
                    responses.push(Response::error(e.code(), e.to_string()));
                }
            }
        }

        responses
    }

    async fn handle_frame(&self, frame: Frame) -> Response {
        if let Some(limiter) = &self.limiter {
            if !limiter.try_acquire() {
                debug!(client = %self.client_id, "Rate limited");
                #[cfg(feature = "metrics")]
                self.poller.observe(|m| m.record_rate_limited());
                return Response::rate_limited();
            }
        }

        match frame {
            Frame::Ping => Response::pong(),
            Frame::Poll(request) => Response::Poll(self.poller.poll(request).await),
        }
    }
}
