//! Main sync server.

use crate::config::ServerConfig;
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::ServerStore;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmirror_protocol::ResourceKind;
use thiserror::Error;
use tracing::{debug, warn};

/// A reply to one POST of the sync endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerReply {
    /// HTTP status.
    pub status: u16,
    /// `Retry-After` hint, if any.
    pub retry_after: Option<Duration>,
    /// Response body.
    pub body: String,
}

impl ServerReply {
    fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }
}

/// The request never produced a reply.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("request timed out")]
pub struct Timeout;

/// A fault to inject into the next request.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The request times out.
    Timeout,
    /// The request is rejected with 429.
    RateLimited {
        /// `Retry-After` hint.
        retry_after: Option<Duration>,
    },
    /// The request is rejected with the given status.
    Status(u16),
    /// All cursors are invalidated before the request is handled.
    Reset,
}

/// The reference sync server.
///
/// Serves the single sync endpoint against an in-memory store. Faults
/// queued with [`SyncServer::inject`] are consumed one per request, in
/// order, before normal handling.
///
/// # Example
///
/// ```
/// use taskmirror_server::{ServerConfig, SyncServer};
/// use serde_json::json;
///
/// let server = SyncServer::new(ServerConfig::default());
/// server.seed_task(json!({"id": "1", "content": "Buy milk"}));
///
/// let reply = server
///     .handle_post("", r#"{"sync_token": "*", "resource_types": ["items"]}"#)
///     .unwrap();
/// assert_eq!(reply.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    faults: Mutex<VecDeque<Fault>>,
    requests: AtomicU64,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ServerStore::new()))
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            faults: Mutex::new(VecDeque::new()),
            requests: AtomicU64::new(0),
        }
    }

    /// Handles one POST of the sync endpoint.
    pub fn handle_post(&self, bearer: &str, body: &str) -> Result<ServerReply, Timeout> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let fault = self.faults.lock().pop_front();
        match fault {
            Some(Fault::Timeout) => {
                debug!("injected timeout");
                return Err(Timeout);
            }
            Some(Fault::RateLimited { retry_after }) => {
                debug!("injected rate limit");
                let mut reply = ServerReply::json(429, &json!({"error": "Too many requests"}));
                reply.retry_after = retry_after;
                return Ok(reply);
            }
            Some(Fault::Status(status)) => {
                debug!(status, "injected status");
                return Ok(ServerReply::json(status, &json!({"error": "Injected failure"})));
            }
            Some(Fault::Reset) => self.force_reset(),
            None => {}
        }

        match self.handler.handle(bearer, body) {
            Ok(response) => Ok(ServerReply::json(200, &response)),
            Err(err) => {
                warn!(error = %err, "sync request rejected");
                Ok(ServerReply::json(
                    err.status(),
                    &json!({"error": err.to_string()}),
                ))
            }
        }
    }

    /// Queues a fault for a future request.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    /// Invalidates every cursor issued so far.
    pub fn force_reset(&self) {
        self.context.store.reset_cursors();
    }

    /// Inserts or replaces a task record.
    pub fn seed_task(&self, record: Value) {
        self.context.store.upsert(ResourceKind::Items, record);
    }

    /// Inserts or replaces a project record.
    pub fn seed_project(&self, record: Value) {
        self.context.store.upsert(ResourceKind::Projects, record);
    }

    /// Inserts or replaces a label record.
    pub fn seed_label(&self, record: Value) {
        self.context.store.upsert(ResourceKind::Labels, record);
    }

    /// Returns the entity store.
    pub fn store(&self) -> &ServerStore {
        &self.context.store
    }

    /// Returns the number of POSTs received, faulted ones included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}
