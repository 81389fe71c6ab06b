//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use taskmirror_protocol::{
    new_command_uuid, Command, CommandResult, ResourceKind, SyncCursor, SyncResponse,
};

/// A sync transport handles network communication with the sync endpoint.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, scripted mock for testing, etc.). Implementations must serialize
/// requests so that cursors are consumed in order.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches a full or incremental resource snapshot.
    async fn fetch(
        &self,
        resources: &[ResourceKind],
        cursor: &SyncCursor,
    ) -> SyncResult<SyncResponse>;

    /// Executes a command batch and returns per-command outcomes.
    async fn execute(
        &self,
        commands: Vec<Command>,
        cursor: &SyncCursor,
        resources: &[ResourceKind],
    ) -> SyncResult<CommandResult>;
}

/// Assigns correlation ids to commands that lack one.
///
/// Fails on an empty batch or when two commands share a correlation id.
pub fn prepare_commands(mut commands: Vec<Command>) -> SyncResult<Vec<Command>> {
    if commands.is_empty() {
        return Err(SyncError::InvalidRequest("command batch is empty".into()));
    }

    let mut seen = HashSet::with_capacity(commands.len());
    for command in &mut commands {
        let uuid = command.uuid.get_or_insert_with(new_command_uuid);
        if !seen.insert(uuid.clone()) {
            return Err(SyncError::InvalidRequest(format!(
                "duplicate command uuid {uuid}"
            )));
        }
    }
    Ok(commands)
}

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Cursor sent with the request.
    pub cursor: SyncCursor,
    /// Requested resource kinds.
    pub resources: Vec<ResourceKind>,
    /// Commands sent, empty for a fetch.
    pub commands: Vec<Command>,
}

/// A scripted transport for testing.
///
/// Each call pops the next queued result. An exhausted script yields a
/// protocol error.
#[derive(Debug, Default)]
pub struct MockTransport {
    fetch_results: Mutex<VecDeque<SyncResult<SyncResponse>>>,
    execute_results: Mutex<VecDeque<SyncResult<CommandResult>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Creates a new mock transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every reply for `delay` after recording the request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a fetch response.
    pub fn push_fetch(&self, response: SyncResponse) {
        self.fetch_results.lock().push_back(Ok(response));
    }

    /// Queues a fetch failure.
    pub fn push_fetch_error(&self, error: SyncError) {
        self.fetch_results.lock().push_back(Err(error));
    }

    /// Queues a command execution result.
    pub fn push_execute(&self, result: CommandResult) {
        self.execute_results.lock().push_back(Ok(result));
    }

    /// Queues a command execution failure.
    pub fn push_execute_error(&self, error: SyncError) {
        self.execute_results.lock().push_back(Err(error));
    }

    /// Returns all requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn record(&self, cursor: &SyncCursor, resources: &[ResourceKind], commands: Vec<Command>) {
        self.requests.lock().push(RecordedRequest {
            cursor: cursor.clone(),
            resources: resources.to_vec(),
            commands,
        });
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn fetch(
        &self,
        resources: &[ResourceKind],
        cursor: &SyncCursor,
    ) -> SyncResult<SyncResponse> {
        self.record(cursor, resources, Vec::new());
        self.pause().await;
        self.fetch_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::protocol("no scripted fetch response")))
    }

    async fn execute(
        &self,
        commands: Vec<Command>,
        cursor: &SyncCursor,
        resources: &[ResourceKind],
    ) -> SyncResult<CommandResult> {
        let commands = prepare_commands(commands)?;
        self.record(cursor, resources, commands);
        self.pause().await;
        self.execute_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::protocol("no scripted execute response")))
    }
}
