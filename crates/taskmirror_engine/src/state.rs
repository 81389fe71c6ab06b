//! Sync coordinator.
//!
//! [`SyncEngine`] owns the cursor, the published snapshot and its id index.
//! Every refresh or mutation runs under one async lock so the cursor moves
//! forward in request order, and all state is written in a single step after
//! the network call returns.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::index::{Entity, EntityIndex};
use crate::reconciler::{Reconciler, Snapshot};
use crate::transport::{prepare_commands, SyncTransport};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use taskmirror_protocol::{
    Command, CommandFailure, CommandResult, ItemArgs, ResourceKind, SyncCursor, SyncResponse,
    Task,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot has been published yet.
    Uninitialized,
    /// A snapshot is published and the cursor is valid.
    Synced,
    /// The server invalidated the cursor; the next request starts from scratch.
    StaleCursor,
}

impl SyncState {
    /// Returns true if a snapshot has been published.
    pub fn has_snapshot(&self) -> bool {
        !matches!(self, SyncState::Uninitialized)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Successful refreshes, including single-task refreshes.
    pub refreshes: u64,
    /// Responses that replaced all state.
    pub full_syncs: u64,
    /// Commands sent to the server.
    pub commands_sent: u64,
    /// Commands rejected by the server.
    pub command_failures: u64,
    /// Cursor resets requested by the server.
    pub token_resets: u64,
    /// Single-task refreshes that fell back to a full refresh.
    pub fallbacks: u64,
    /// Last time a snapshot was published.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a command batch.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Correlation ids of commands that succeeded.
    pub succeeded: Vec<String>,
    /// Commands that failed, with server error details.
    pub failed: Vec<CommandFailure>,
    /// Placeholder id to real id mapping.
    pub temp_id_mapping: BTreeMap<String, String>,
    /// Task records returned with the results.
    pub delta_tasks: Vec<Task>,
    /// Snapshot published after merging the results.
    pub snapshot: Arc<Snapshot>,
}

impl CommandOutcome {
    /// Returns true if every command succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the correlation ids of failed commands.
    pub fn failed_uuids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.uuid.as_str()).collect()
    }

    /// Resolves a temp id to the server-assigned id.
    pub fn resolve_temp_id(&self, temp_id: &str) -> Option<&str> {
        self.temp_id_mapping.get(temp_id).map(String::as_str)
    }

    /// Formats failures as `uuid:reason` pairs.
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|f| format!("{}:{}", f.uuid, f.reason()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Mutable coordinator state, replaced in one write.
struct Mirror {
    cursor: SyncCursor,
    state: SyncState,
    index: Option<EntityIndex>,
}

/// The sync engine keeps a local mirror of the remote task service.
pub struct SyncEngine<T: SyncTransport> {
    transport: Arc<T>,
    resources: Vec<ResourceKind>,
    cycle: Mutex<()>,
    mirror: RwLock<Mirror>,
    stats: RwLock<SyncStats>,
    published: watch::Sender<Option<Arc<Snapshot>>>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine starting from the wildcard cursor.
    pub fn new(config: &SyncConfig, transport: T) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            transport: Arc::new(transport),
            resources: config.resources.clone(),
            cycle: Mutex::new(()),
            mirror: RwLock::new(Mirror {
                cursor: SyncCursor::wildcard(),
                state: SyncState::Uninitialized,
                index: None,
            }),
            stats: RwLock::new(SyncStats::default()),
            published,
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.mirror.read().state
    }

    /// Gets the stored cursor.
    pub fn cursor(&self) -> SyncCursor {
        self.mirror.read().cursor.clone()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the last published snapshot.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.mirror
            .read()
            .index
            .as_ref()
            .map(|index| index.snapshot().clone())
    }

    /// Looks up a cached entity by id.
    pub fn get_cached(&self, id: &str) -> Option<Entity> {
        self.mirror.read().index.as_ref()?.get(id)
    }

    /// Looks up a cached live task by id.
    pub fn get_cached_task(&self, id: &str) -> Option<Task> {
        self.mirror.read().index.as_ref()?.task(id).cloned()
    }

    /// Subscribes to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.published.subscribe()
    }

    /// Fetches all configured resources and publishes the merged snapshot.
    ///
    /// A token reset restarts from the wildcard cursor exactly once. On
    /// failure the last good snapshot stays published.
    pub async fn refresh(&self) -> SyncResult<Arc<Snapshot>> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let result = self.refresh_locked().await;
        self.finish("refresh", started, &result);
        result
    }

    async fn refresh_locked(&self) -> SyncResult<Arc<Snapshot>> {
        let cursor = self.cursor();
        let (response, sent) = match self.transport.fetch(&self.resources, &cursor).await {
            Err(SyncError::TokenReset) => {
                self.mark_stale("refresh");
                let wildcard = SyncCursor::wildcard();
                let response = self.transport.fetch(&self.resources, &wildcard).await?;
                (response, wildcard)
            }
            other => (other?, cursor),
        };

        let resources = self.resources.clone();
        let snapshot = self.publish(&response, &sent, &resources);
        self.stats.write().refreshes += 1;
        Ok(snapshot)
    }

    /// Executes commands and merges the returned delta.
    ///
    /// If any command is rejected the merged effects of the others are kept
    /// and [`SyncError::CommandFailure`] carries the full outcome.
    pub async fn mutate(&self, commands: Vec<Command>) -> SyncResult<CommandOutcome> {
        let resources = self.resources.clone();
        self.execute(commands, &resources, "mutate").await
    }

    async fn execute(
        &self,
        commands: Vec<Command>,
        resources: &[ResourceKind],
        operation: &'static str,
    ) -> SyncResult<CommandOutcome> {
        let commands = prepare_commands(commands)?;
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let result = self.execute_locked(commands, resources).await;
        self.finish(operation, started, &result);
        result
    }

    async fn execute_locked(
        &self,
        commands: Vec<Command>,
        resources: &[ResourceKind],
    ) -> SyncResult<CommandOutcome> {
        let count = commands.len() as u64;
        let cursor = self.cursor();

        let (result, sent) = match self
            .transport
            .execute(commands.clone(), &cursor, resources)
            .await
        {
            Err(SyncError::TokenReset) => {
                self.mark_stale("mutate");
                let wildcard = SyncCursor::wildcard();
                let result = self.transport.execute(commands, &wildcard, resources).await?;
                (result, wildcard)
            }
            other => (other?, cursor),
        };

        let snapshot = self.publish(&result.sync, &sent, resources);
        let outcome = outcome_from(result, snapshot);

        {
            let mut stats = self.stats.write();
            stats.commands_sent += count;
            stats.command_failures += outcome.failed.len() as u64;
        }

        debug!(
            commands = count,
            failed = outcome.failed.len(),
            delta_tasks = outcome.delta_tasks.len(),
            "command batch applied"
        );

        if outcome.is_success() {
            Ok(outcome)
        } else {
            Err(SyncError::CommandFailure(Box::new(outcome)))
        }
    }

    /// Refreshes tasks only, keeping the request small.
    ///
    /// Falls back to a full refresh when the task is neither in the response
    /// nor cached, or when the server rate limits or resets the cursor.
    pub async fn refresh_one(&self, id: &str) -> SyncResult<Arc<Snapshot>> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let result = self.refresh_one_locked(id).await;
        self.finish("refresh_one", started, &result);
        result
    }

    async fn refresh_one_locked(&self, id: &str) -> SyncResult<Arc<Snapshot>> {
        let scope = [ResourceKind::Items];
        let cursor = self.cursor();

        match self.transport.fetch(&scope, &cursor).await {
            Ok(response) => {
                let hit = response.contains_task(id);
                let snapshot = self.publish(&response, &cursor, &scope);
                self.stats.write().refreshes += 1;
                debug!(task_id = id, cache_hit = hit, delta = response.tasks.len(), "task refreshed");

                if hit || snapshot.task(id).is_some() {
                    return Ok(snapshot);
                }
                info!(task_id = id, "task not found in delta, running full refresh");
                self.fall_back().await
            }
            Err(SyncError::RateLimited { retry_after }) => {
                warn!(task_id = id, ?retry_after, "rate limited refreshing task, running full refresh");
                self.fall_back().await
            }
            Err(SyncError::TokenReset) => {
                self.mark_stale("refresh_one");
                self.fall_back().await
            }
            Err(err) => Err(err),
        }
    }

    async fn fall_back(&self) -> SyncResult<Arc<Snapshot>> {
        self.stats.write().fallbacks += 1;
        self.refresh_locked().await
    }

    /// Creates a task and returns it as cached after the merge.
    ///
    /// The new id comes from the temp id mapping, or failing that from the
    /// last task in the returned delta.
    pub async fn add_task(&self, args: &ItemArgs) -> SyncResult<Option<Task>> {
        let command = Command::item_add(args);
        let temp_id = command.temp_id.clone();
        let resources = self.resources.clone();
        let outcome = self.execute(vec![command], &resources, "add_task").await?;

        let real_id = temp_id
            .as_deref()
            .and_then(|temp| outcome.resolve_temp_id(temp))
            .map(str::to_string)
            .or_else(|| outcome.delta_tasks.last().map(|t| t.id.clone()));

        debug!(task_id = real_id.as_deref(), "task added");
        Ok(real_id.and_then(|id| outcome.snapshot.task(&id).cloned()))
    }

    /// Updates a task and optionally closes or reopens it in the same batch.
    ///
    /// Returns `None` without contacting the server when there is nothing
    /// to send.
    pub async fn update_task(
        &self,
        id: &str,
        args: &ItemArgs,
        close: bool,
        reopen: bool,
    ) -> SyncResult<Option<CommandOutcome>> {
        if close && reopen {
            return Err(SyncError::InvalidRequest(
                "a task cannot be closed and reopened in the same batch".into(),
            ));
        }

        let mut commands = Vec::new();
        if !args.is_empty() {
            commands.push(Command::item_update(id, args));
        }
        if close {
            commands.push(Command::item_complete(id));
        }
        if reopen {
            commands.push(Command::item_uncomplete(id));
        }

        if commands.is_empty() {
            debug!(task_id = id, "nothing to update");
            return Ok(None);
        }

        self.execute(commands, &[ResourceKind::Items], "update_task")
            .await
            .map(Some)
    }

    /// Marks a task completed.
    pub async fn close_task(&self, id: &str) -> SyncResult<CommandOutcome> {
        self.execute(vec![Command::item_complete(id)], &[ResourceKind::Items], "close_task")
            .await
    }

    /// Marks a completed task open again.
    pub async fn reopen_task(&self, id: &str) -> SyncResult<CommandOutcome> {
        self.execute(
            vec![Command::item_uncomplete(id)],
            &[ResourceKind::Items],
            "reopen_task",
        )
        .await
    }

    /// Deletes a task.
    pub async fn delete_task(&self, id: &str) -> SyncResult<CommandOutcome> {
        self.execute(vec![Command::item_delete(id)], &[ResourceKind::Items], "delete_task")
            .await
    }

    fn mark_stale(&self, operation: &'static str) {
        warn!(operation, "sync token reset by server, restarting from scratch");
        {
            let mut mirror = self.mirror.write();
            mirror.cursor = SyncCursor::wildcard();
            mirror.state = SyncState::StaleCursor;
        }
        self.stats.write().token_resets += 1;
    }

    /// Merges a response and swaps in the new snapshot, index and cursor.
    ///
    /// The cursor only advances when the request covered every configured
    /// resource kind.
    fn publish(
        &self,
        response: &SyncResponse,
        sent: &SyncCursor,
        scope: &[ResourceKind],
    ) -> Arc<Snapshot> {
        let response = if sent.is_wildcard() && !response.full_sync {
            let mut full = response.clone();
            full.full_sync = true;
            Cow::Owned(full)
        } else {
            Cow::Borrowed(response)
        };
        let covers_all = self.resources.iter().all(|kind| scope.contains(kind));

        let snapshot = {
            let mut mirror = self.mirror.write();
            let previous = mirror.index.as_ref().map(|index| index.snapshot().clone());
            let snapshot = Arc::new(Reconciler::apply_scoped(
                previous.as_deref(),
                &response,
                scope,
                Utc::now(),
            ));

            mirror.index = Some(EntityIndex::build(snapshot.clone()));
            mirror.state = SyncState::Synced;
            if covers_all {
                mirror.cursor = response.sync_token.clone();
            }
            snapshot
        };

        {
            let mut stats = self.stats.write();
            if response.full_sync {
                stats.full_syncs += 1;
            }
            stats.last_sync_time = Some(snapshot.last_update);
            stats.last_error = None;
        }

        info!(
            full_sync = response.full_sync,
            tasks = snapshot.tasks.len(),
            projects = snapshot.projects.len(),
            labels = snapshot.labels.len(),
            delta_tasks = response.tasks.len(),
            cursor_suffix = response.sync_token.suffix(),
            "snapshot published"
        );

        self.published.send_replace(Some(snapshot.clone()));
        snapshot
    }

    fn finish<R>(&self, operation: &'static str, started: Instant, result: &SyncResult<R>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => debug!(operation, elapsed_ms, "sync operation completed"),
            Err(err) => {
                warn!(operation, elapsed_ms, error = %err, "sync operation failed");
                self.stats.write().last_error = Some(err.to_string());
            }
        }
    }
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    /// Refreshes a single task in the background.
    ///
    /// The caller does not wait for the result; it queues behind any running
    /// refresh or mutation.
    pub fn spawn_refresh_one(self: &Arc<Self>, id: impl Into<String>) -> JoinHandle<SyncResult<Arc<Snapshot>>> {
        let engine = Arc::clone(self);
        let id = id.into();
        tokio::spawn(async move { engine.refresh_one(&id).await })
    }
}

fn outcome_from(result: CommandResult, snapshot: Arc<Snapshot>) -> CommandOutcome {
    CommandOutcome {
        succeeded: result.succeeded,
        failed: result.failed,
        temp_id_mapping: result.temp_id_mapping,
        delta_tasks: result.sync.tasks,
        snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::{json, Value};
    use std::time::Duration;
    use taskmirror_protocol::Project;
    use taskmirror_testkit::prelude::*;

    fn engine() -> SyncEngine<MockTransport> {
        SyncEngine::new(&SyncConfig::new("t"), MockTransport::new())
    }

    fn record(id: &str, content: &str) -> Value {
        task_in_project(id, content, "p", 0)
    }

    fn full(cursor: &str, items: Vec<Value>) -> SyncResponse {
        SyncResponse::decode(&full_response(cursor, items)).unwrap()
    }

    fn delta(cursor: &str, items: Vec<Value>) -> SyncResponse {
        SyncResponse::decode(&delta_response(cursor, items)).unwrap()
    }

    fn command_result(cursor: &str, items: Vec<Value>, statuses: &[(&str, Value)]) -> CommandResult {
        CommandResult::decode(&command_response(cursor, items, statuses, &[])).unwrap()
    }

    #[test]
    fn initial_state() {
        let engine = engine();
        assert_eq!(engine.state(), SyncState::Uninitialized);
        assert!(!engine.state().has_snapshot());
        assert!(engine.cursor().is_wildcard());
        assert!(engine.current_snapshot().is_none());
        assert!(engine.get_cached("1").is_none());
    }

    #[tokio::test]
    async fn refresh_publishes_snapshot_and_cursor() {
        let engine = engine();
        engine
            .transport()
            .push_fetch(full("c1", vec![record("1", "a"), record("2", "b")]));

        let snapshot = engine.refresh().await.unwrap();
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.cursor().as_str(), "c1");
        assert_eq!(engine.get_cached_task("2").unwrap().content, "b");
        assert_eq!(engine.stats().refreshes, 1);
        assert_eq!(engine.stats().full_syncs, 1);

        let requests = engine.transport().requests();
        assert!(requests[0].cursor.is_wildcard());
        assert_eq!(requests[0].resources, ResourceKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn wildcard_response_without_flag_is_full() {
        let engine = engine();
        engine.transport().push_fetch(delta("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();
        assert_eq!(engine.stats().full_syncs, 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_snapshot() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();

        engine
            .transport()
            .push_fetch_error(SyncError::RateLimited { retry_after: None });
        let err = engine.refresh().await.unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(engine.cursor().as_str(), "c1");
        assert!(engine.get_cached_task("1").is_some());
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn auth_failure_propagates_unmodified() {
        let engine = engine();
        engine
            .transport()
            .push_fetch_error(SyncError::Auth("HTTP 401".into()));
        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(ref m) if m == "HTTP 401"));
        assert_eq!(engine.state(), SyncState::Uninitialized);
    }

    #[tokio::test]
    async fn token_reset_retries_once_from_wildcard() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();

        engine.transport().push_fetch_error(SyncError::TokenReset);
        engine.transport().push_fetch(full("c2", vec![record("2", "b")]));
        let snapshot = engine.refresh().await.unwrap();

        assert!(snapshot.task("1").is_none());
        assert_eq!(engine.cursor().as_str(), "c2");
        assert_eq!(engine.stats().token_resets, 1);

        let requests = engine.transport().requests();
        assert_eq!(requests[1].cursor.as_str(), "c1");
        assert!(requests[2].cursor.is_wildcard());
    }

    #[tokio::test]
    async fn repeated_token_reset_surfaces() {
        let engine = engine();
        engine.transport().push_fetch_error(SyncError::TokenReset);
        engine.transport().push_fetch_error(SyncError::TokenReset);
        engine.transport().push_fetch(full("never", vec![]));

        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, SyncError::TokenReset));
        assert_eq!(engine.transport().request_count(), 2);
        assert_eq!(engine.state(), SyncState::StaleCursor);
        assert!(engine.cursor().is_wildcard());
    }

    #[tokio::test]
    async fn mutate_partial_failure_keeps_applied_effects() {
        let engine = engine();
        engine
            .transport()
            .push_fetch(full("c1", vec![record("1", "one"), record("2", "two")]));
        engine.refresh().await.unwrap();

        engine.transport().push_execute(command_result(
            "c2",
            vec![record("1", "one updated")],
            &[
                ("ok-uuid", json!("ok")),
                ("bad-uuid", command_error(22, "Item not found")),
            ],
        ));

        let commands = vec![
            Command::item_update("1", &ItemArgs::new("one updated")).with_uuid("ok-uuid"),
            Command::item_update("2", &ItemArgs::new("two updated")).with_uuid("bad-uuid"),
        ];
        let err = engine.mutate(commands).await.unwrap_err();

        let outcome = err.command_outcome().unwrap();
        assert_eq!(outcome.failed_uuids(), vec!["bad-uuid"]);
        assert_eq!(outcome.succeeded, vec!["ok-uuid".to_string()]);
        assert_eq!(outcome.snapshot.task("1").unwrap().content, "one updated");
        assert_eq!(engine.get_cached_task("2").unwrap().content, "two");
        assert!(err.to_string().contains("bad-uuid:Item not found"));
        assert_eq!(engine.stats().command_failures, 1);
        assert_eq!(engine.cursor().as_str(), "c2");
    }

    #[tokio::test]
    async fn mutate_token_reset_replays_same_uuids() {
        let engine = engine();
        engine.transport().push_execute_error(SyncError::TokenReset);
        engine.transport().push_execute(command_result(
            "c1",
            vec![],
            &[("u1", json!("ok"))],
        ));

        engine
            .mutate(vec![Command::item_delete("1").with_uuid("u1")])
            .await
            .unwrap();

        let requests = engine.transport().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].cursor.is_wildcard());
        assert_eq!(requests[0].commands, requests[1].commands);
    }

    #[tokio::test]
    async fn mutate_assigns_uuids_once() {
        let engine = engine();
        engine.transport().push_execute_error(SyncError::TokenReset);
        engine
            .transport()
            .push_execute(command_result("c1", vec![], &[]));

        engine.mutate(vec![Command::item_delete("1")]).await.unwrap();

        let requests = engine.transport().requests();
        assert!(requests[0].commands[0].uuid.is_some());
        assert_eq!(requests[0].commands[0].uuid, requests[1].commands[0].uuid);
    }

    #[tokio::test]
    async fn add_task_resolves_temp_id() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![]));
        engine.refresh().await.unwrap();

        // The temp id is generated inside add_task, so answer with the
        // delta only and let the fallback pick the last task.
        engine.transport().push_execute(command_result(
            "c2",
            vec![record("900", "new task")],
            &[],
        ));

        let added = engine.add_task(&ItemArgs::new("new task")).await.unwrap();
        assert_eq!(added.unwrap().id, "900");

        let requests = engine.transport().requests();
        assert_eq!(requests[1].resources, ResourceKind::ALL.to_vec());
        assert!(requests[1].commands[0].temp_id.is_some());
    }

    #[tokio::test]
    async fn update_task_rejects_close_and_reopen() {
        let engine = engine();
        let err = engine
            .update_task("1", &ItemArgs::default(), true, true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert_eq!(engine.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn update_task_without_changes_is_noop() {
        let engine = engine();
        let outcome = engine
            .update_task("1", &ItemArgs::default(), false, false)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(engine.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn update_and_close_share_one_batch() {
        let engine = engine();
        engine
            .transport()
            .push_execute(command_result("c1", vec![], &[]));

        engine
            .update_task("1", &ItemArgs::default().with_priority(4), true, false)
            .await
            .unwrap();

        let requests = engine.transport().requests();
        let kinds: Vec<_> = requests[0].commands.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["item_update", "item_complete"]);
        assert_eq!(requests[0].resources, vec![ResourceKind::Items]);
    }

    #[tokio::test]
    async fn scoped_mutation_does_not_advance_cursor() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();

        let done = completed(record("1", "a"));
        engine
            .transport()
            .push_execute(command_result("c2", vec![done], &[]));
        engine.close_task("1").await.unwrap();

        assert!(engine.get_cached_task("1").unwrap().is_completed);
        assert_eq!(engine.cursor().as_str(), "c1");
    }

    #[tokio::test]
    async fn delete_task_leaves_tombstone() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();

        let gone = deleted(record("1", "a"));
        engine
            .transport()
            .push_execute(command_result("c2", vec![gone], &[]));
        let outcome = engine.delete_task("1").await.unwrap();

        assert!(outcome.snapshot.task("1").is_none());
        assert!(outcome.snapshot.tombstone("1").is_some());
        assert!(engine.get_cached("1").is_none());
    }

    #[tokio::test]
    async fn refresh_one_hit_keeps_projects() {
        let engine = engine();
        let mut everything = full("c1", vec![record("1", "a")]);
        everything.projects = vec![Project::new("p", "Inbox")];
        engine.transport().push_fetch(everything);
        engine.refresh().await.unwrap();

        engine.transport().push_fetch(delta("c2", vec![record("1", "changed")]));
        let snapshot = engine.refresh_one("1").await.unwrap();

        assert_eq!(snapshot.task("1").unwrap().content, "changed");
        assert_eq!(snapshot.projects.len(), 1);
        assert_eq!(engine.transport().request_count(), 2);
        assert_eq!(
            engine.transport().requests()[1].resources,
            vec![ResourceKind::Items]
        );
    }

    #[tokio::test]
    async fn refresh_one_miss_falls_back_to_full_refresh() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![]));
        engine.refresh().await.unwrap();

        engine.transport().push_fetch(delta("c2", vec![]));
        engine.transport().push_fetch(delta("c3", vec![record("5", "found")]));
        let snapshot = engine.refresh_one("5").await.unwrap();

        assert!(snapshot.task("5").is_some());
        assert_eq!(engine.stats().fallbacks, 1);
        assert_eq!(engine.cursor().as_str(), "c3");
    }

    #[tokio::test]
    async fn refresh_one_rate_limit_falls_back() {
        let engine = engine();
        engine
            .transport()
            .push_fetch_error(SyncError::RateLimited { retry_after: None });
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));

        let snapshot = engine.refresh_one("1").await.unwrap();
        assert!(snapshot.task("1").is_some());
        assert_eq!(engine.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn refresh_one_token_reset_falls_back_from_wildcard() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![]));
        engine.refresh().await.unwrap();

        engine.transport().push_fetch_error(SyncError::TokenReset);
        engine.transport().push_fetch(full("c2", vec![record("1", "a")]));
        engine.refresh_one("1").await.unwrap();

        let requests = engine.transport().requests();
        assert!(requests[2].cursor.is_wildcard());
        assert_eq!(engine.stats().token_resets, 1);
    }

    #[tokio::test]
    async fn refresh_one_other_errors_surface() {
        let engine = engine();
        engine
            .transport()
            .push_fetch_error(SyncError::Auth("HTTP 401".into()));
        let err = engine.refresh_one("1").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(engine.stats().fallbacks, 0);
    }

    #[tokio::test]
    async fn subscribers_see_new_snapshots() {
        let engine = engine();
        let mut updates = engine.subscribe();
        assert!(updates.borrow().is_none());

        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.refresh().await.unwrap();

        updates.changed().await.unwrap();
        let seen = updates.borrow_and_update().clone().unwrap();
        assert_eq!(seen.tasks.len(), 1);
    }

    #[tokio::test]
    async fn spawned_refresh_one_merges_in_background() {
        let engine = Arc::new(engine());
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));

        let handle = engine.spawn_refresh_one("1");
        handle.await.unwrap().unwrap();
        assert!(engine.get_cached_task("1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refresh_and_mutate_queue_in_order() {
        let transport = MockTransport::new().with_delay(Duration::from_secs(1));
        let engine = SyncEngine::new(&SyncConfig::new("t"), transport);
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        engine.transport().push_execute(command_result(
            "c2",
            vec![record("1", "b")],
            &[("u1", json!("ok"))],
        ));

        let started = tokio::time::Instant::now();
        let (refreshed, mutated) = tokio::join!(
            engine.refresh(),
            engine.mutate(vec![
                Command::item_update("1", &ItemArgs::new("b")).with_uuid("u1")
            ]),
        );
        refreshed.unwrap();
        mutated.unwrap();

        let requests = engine.transport().requests();
        assert!(requests[0].cursor.is_wildcard());
        assert_eq!(requests[1].cursor.as_str(), "c1");
        assert_eq!(engine.cursor().as_str(), "c2");
        assert_eq!(engine.get_cached_task("1").unwrap().content, "b");
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_mutate_leaves_mirror_untouched() {
        let transport = MockTransport::new().with_delay(Duration::from_secs(1));
        let engine = SyncEngine::new(&SyncConfig::new("t"), transport);
        engine.transport().push_fetch(full("c1", vec![record("1", "a")]));
        let before = engine.refresh().await.unwrap();

        engine.transport().push_execute(command_result(
            "c2",
            vec![record("1", "changed")],
            &[("u1", json!("ok"))],
        ));
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            engine.mutate(vec![
                Command::item_update("1", &ItemArgs::new("changed")).with_uuid("u1")
            ]),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(engine.transport().request_count(), 2);
        assert_eq!(engine.cursor().as_str(), "c1");
        assert!(Arc::ptr_eq(&engine.current_snapshot().unwrap(), &before));
        assert_eq!(engine.get_cached_task("1").unwrap().content, "a");
        assert_eq!(engine.stats().commands_sent, 0);

        // The cycle lock was released on drop.
        engine.transport().push_fetch(delta("c3", vec![]));
        engine.refresh().await.unwrap();
        assert_eq!(engine.cursor().as_str(), "c3");
    }

    #[tokio::test]
    async fn cursor_progresses_with_each_refresh() {
        let engine = engine();
        engine.transport().push_fetch(full("c1", vec![]));
        engine.transport().push_fetch(delta("c2", vec![]));
        engine.transport().push_fetch(delta("c3", vec![]));

        for expected in ["c1", "c2", "c3"] {
            engine.refresh().await.unwrap();
            assert_eq!(engine.cursor().as_str(), expected);
        }

        let sent: Vec<_> = engine
            .transport()
            .requests()
            .iter()
            .map(|r| r.cursor.as_str().to_string())
            .collect();
        assert_eq!(sent, vec!["*", "c1", "c2"]);
    }
}
