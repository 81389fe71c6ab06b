//! Snapshot construction from sync responses.
//!
//! The reconciler is the only place snapshots are built. It folds a server
//! response into the previous snapshot (or starts fresh on a full sync),
//! drops removed entities and sorts the result.
//!
//! ## Guarantees
//!
//! - No deleted or archived entity appears in a snapshot
//! - Applying the same delta twice yields the same snapshot
//! - Applying delta A then B equals applying their union with B winning per id

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use taskmirror_protocol::{Label, Project, ResourceKind, SyncEntity, SyncResponse, Task};

/// Maximum number of removed tasks a snapshot remembers.
pub const MAX_TOMBSTONES: usize = 256;

/// An immutable view of the mirrored entities at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Live tasks sorted by `(project_id, order, id)`.
    pub tasks: Vec<Task>,
    /// Live projects sorted by `(order, name)`.
    pub projects: Vec<Project>,
    /// Live labels sorted by `(order, name)`.
    pub labels: Vec<Label>,
    /// Tasks removed since the last full sync, oldest first.
    ///
    /// Holds at most [`MAX_TOMBSTONES`] entries; older ones are forgotten.
    #[serde(skip)]
    pub tombstones: Vec<Task>,
    /// When this snapshot was built.
    pub last_update: DateTime<Utc>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            tasks: Vec::new(),
            projects: Vec::new(),
            labels: Vec::new(),
            tombstones: Vec::new(),
            last_update: at,
        }
    }

    /// Looks up a live task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Looks up a live project by id.
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Looks up a live label by id.
    pub fn label(&self, id: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.id == id)
    }

    /// Looks up a removed task by id.
    pub fn tombstone(&self, id: &str) -> Option<&Task> {
        self.tombstones.iter().find(|t| t.id == id)
    }

    /// Returns the live tasks of a project, in snapshot order.
    pub fn tasks_in_project<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Task> {
        self.tasks
            .iter()
            .filter(move |t| t.project_id.as_deref() == Some(project_id))
    }
}

/// Builds snapshots from sync responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Merges a response into the previous snapshot, stamped with the current time.
    pub fn apply(previous: Option<&Snapshot>, response: &SyncResponse) -> Snapshot {
        Self::apply_at(previous, response, Utc::now())
    }

    /// Merges a response into the previous snapshot.
    ///
    /// A full-sync response, or one with no previous snapshot, replaces all
    /// state. Otherwise each delta entity overwrites the entity with the same
    /// id, and removed entities are dropped.
    pub fn apply_at(
        previous: Option<&Snapshot>,
        response: &SyncResponse,
        at: DateTime<Utc>,
    ) -> Snapshot {
        Self::apply_scoped(previous, response, &ResourceKind::ALL, at)
    }

    /// Merges a response that only covers the given resource kinds.
    ///
    /// Kinds outside `scope` are carried over from the previous snapshot
    /// untouched, even on a full sync.
    pub fn apply_scoped(
        previous: Option<&Snapshot>,
        response: &SyncResponse,
        scope: &[ResourceKind],
        at: DateTime<Utc>,
    ) -> Snapshot {
        let base = match previous {
            Some(snapshot) if !response.full_sync => Some(snapshot),
            _ => None,
        };
        let in_scope = |kind| scope.contains(&kind);

        let (tasks, tombstones) = if in_scope(ResourceKind::Items) {
            let tombstones = bury(base.map(|s| s.tombstones.as_slice()), &response.tasks);
            let mut tasks = fold(base.map(|s| s.tasks.as_slice()), &response.tasks);
            tasks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            (tasks, tombstones)
        } else {
            previous
                .map(|s| (s.tasks.clone(), s.tombstones.clone()))
                .unwrap_or_default()
        };

        let projects = if in_scope(ResourceKind::Projects) {
            let mut projects = fold(base.map(|s| s.projects.as_slice()), &response.projects);
            projects.sort_by(|a, b| (a.order, &a.name, &a.id).cmp(&(b.order, &b.name, &b.id)));
            projects
        } else {
            previous.map(|s| s.projects.clone()).unwrap_or_default()
        };

        let labels = if in_scope(ResourceKind::Labels) {
            let mut labels = fold(base.map(|s| s.labels.as_slice()), &response.labels);
            labels.sort_by(|a, b| (a.order, &a.name, &a.id).cmp(&(b.order, &b.name, &b.id)));
            labels
        } else {
            previous.map(|s| s.labels.clone()).unwrap_or_default()
        };

        Snapshot {
            tasks,
            projects,
            labels,
            tombstones,
            last_update: at,
        }
    }
}

/// Moves removed tasks to the end of the tombstone list, dropping the oldest
/// beyond [`MAX_TOMBSTONES`].
fn bury(previous: Option<&[Task]>, delta: &[Task]) -> Vec<Task> {
    let touched: HashSet<&str> = delta.iter().map(|t| t.id.as_str()).collect();
    let last: HashMap<&str, usize> = delta
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut tombstones: Vec<Task> = previous
        .unwrap_or_default()
        .iter()
        .filter(|t| !touched.contains(t.id.as_str()))
        .cloned()
        .collect();
    tombstones.extend(
        delta
            .iter()
            .enumerate()
            .filter(|(i, t)| t.is_removed() && last.get(t.id.as_str()) == Some(i))
            .map(|(_, t)| t.clone()),
    );

    let excess = tombstones.len().saturating_sub(MAX_TOMBSTONES);
    tombstones.drain(..excess);
    tombstones
}

/// Folds delta entities into the previous entities, last writer wins per id.
fn fold<T: SyncEntity>(previous: Option<&[T]>, delta: &[T]) -> Vec<T> {
    let mut keyed: BTreeMap<String, T> = previous
        .unwrap_or_default()
        .iter()
        .map(|e| (e.id().to_string(), e.clone()))
        .collect();

    for entity in delta {
        if entity.is_removed() {
            keyed.remove(entity.id());
        } else {
            keyed.insert(entity.id().to_string(), entity.clone());
        }
    }

    keyed.into_values().filter(|e| !e.is_removed()).collect()
}
