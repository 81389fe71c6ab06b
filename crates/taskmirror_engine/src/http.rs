//! HTTP transport implementation.
//!
//! This module provides the JSON-over-POST transport for the sync engine.
//! The actual HTTP client is abstracted via a trait so that tests can route
//! requests to an in-process server instead of the network.
//!
//! ## Retry policy
//!
//! - Timeouts and connection failures back off exponentially and are retried
//!   until the attempt budget is spent
//! - HTTP 429 waits for the server-suggested delay (or the current backoff)
//!   and retries within the same budget
//! - HTTP 401 fails immediately
//! - Any other status >= 400 fails immediately with the body attached

use crate::config::{ApiToken, RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::{prepare_commands, SyncTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use taskmirror_protocol::{
    server_error, Command, CommandResult, ResourceKind, SyncCursor, SyncRequest, SyncResponse,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Parsed `Retry-After` header, if present.
    pub retry_after: Option<Duration>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    /// Creates a response with the given status and body.
    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Sets the `Retry-After` delay.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// A request that never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other client-side failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request with bearer authentication.
    async fn post(
        &self,
        url: &str,
        bearer: &str,
        body: String,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// Counters kept by [`HttpTransport`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Logical requests started.
    pub requests: u64,
    /// HTTP attempts made.
    pub attempts: u64,
    /// Number of backoff sleeps.
    pub backoff_sleeps: u64,
    /// Sum of all backoff sleeps.
    pub total_backoff: Duration,
    /// Most recent backoff sleep.
    pub last_backoff: Option<Duration>,
}

/// HTTP-based sync transport.
///
/// Holds an async mutex for the whole request lifecycle so at most one
/// request is in flight per transport.
pub struct HttpTransport<C: HttpClient> {
    endpoint: String,
    token: ApiToken,
    retry: RetryConfig,
    client: C,
    in_flight: Mutex<()>,
    stats: parking_lot::Mutex<TransportStats>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport from a sync configuration.
    pub fn new(config: &SyncConfig, client: C) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            retry: config.retry.clone(),
            client,
            in_flight: Mutex::new(()),
            stats: parking_lot::Mutex::new(TransportStats::default()),
        }
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns a copy of the transport counters.
    pub fn stats(&self) -> TransportStats {
        self.stats.lock().clone()
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn backoff(&self, delay: Duration) {
        {
            let mut stats = self.stats.lock();
            stats.backoff_sleeps += 1;
            stats.total_backoff += delay;
            stats.last_backoff = Some(delay);
        }
        tokio::time::sleep(delay).await;
    }

    /// Sends a request and returns the validated JSON body.
    async fn send(&self, request: &SyncRequest) -> SyncResult<Value> {
        let _guard = self.in_flight.lock().await;

        let body = serde_json::to_string(request)
            .map_err(|e| SyncError::protocol(format!("failed to encode request: {e}")))?;

        self.stats.lock().requests += 1;
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            self.stats.lock().attempts += 1;
            debug!(
                attempt,
                cursor_suffix = request.sync_token.suffix(),
                commands = request.commands.len(),
                "sending sync request"
            );

            match self
                .client
                .post(&self.endpoint, self.token.expose(), body.clone())
                .await
            {
                Ok(response) => match response.status {
                    401 => {
                        warn!(attempt, "sync endpoint rejected credentials");
                        return Err(SyncError::Auth(describe_status(&response)));
                    }
                    429 => {
                        if attempt == max_attempts {
                            return Err(SyncError::RateLimited {
                                retry_after: response.retry_after,
                            });
                        }
                        let delay = response
                            .retry_after
                            .unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            "rate limited, retrying"
                        );
                        self.backoff(delay).await;
                    }
                    status if status >= 400 => {
                        return Err(SyncError::Server {
                            status,
                            body: response.body,
                        });
                    }
                    _ => {
                        debug!(
                            attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "sync request completed"
                        );
                        return parse_body(&response.body);
                    }
                },
                Err(failure) => {
                    last_failure = failure.to_string();
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "sync request failed, retrying"
                    );
                    self.backoff(delay).await;
                }
            }
        }

        warn!(
            attempts = max_attempts,
            error = %last_failure,
            "sync request failed after all attempts"
        );
        Err(SyncError::Request {
            attempts: max_attempts,
            message: last_failure,
        })
    }
}

fn describe_status(response: &HttpResponse) -> String {
    let body = response.body.trim();
    if body.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        format!("HTTP {}: {}", response.status, body)
    }
}

fn parse_body(body: &str) -> SyncResult<Value> {
    if body.trim().is_empty() {
        return Err(SyncError::protocol("empty response body"));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::protocol(format!("response is not valid JSON: {e}")))?;

    if let Some(message) = server_error(&value) {
        return Err(SyncError::Protocol(message));
    }

    let cursor = value.get("sync_token").and_then(Value::as_str).map(SyncCursor::new);
    if cursor.is_some_and(|cursor| cursor.is_reset()) {
        return Err(SyncError::TokenReset);
    }

    Ok(value)
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn fetch(
        &self,
        resources: &[ResourceKind],
        cursor: &SyncCursor,
    ) -> SyncResult<SyncResponse> {
        let request = SyncRequest::fetch(cursor.clone(), resources);
        let body = self.send(&request).await?;
        Ok(SyncResponse::decode(&body)?)
    }

    async fn execute(
        &self,
        commands: Vec<Command>,
        cursor: &SyncCursor,
        resources: &[ResourceKind],
    ) -> SyncResult<CommandResult> {
        let commands = prepare_commands(commands)?;
        let request = SyncRequest::execute(cursor.clone(), commands, resources);
        let body = self.send(&request).await?;
        Ok(CommandResult::decode(&body)?)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, bearer: &str, body: &str) -> Result<HttpResponse, TransportFailure>;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server behind this client.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    async fn post(
        &self,
        _url: &str,
        bearer: &str,
        body: String,
    ) -> Result<HttpResponse, TransportFailure> {
        self.server.handle_post(bearer, &body)
    }
}
