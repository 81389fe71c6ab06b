//! Id lookup over a published snapshot.

use crate::reconciler::Snapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use taskmirror_protocol::{Label, Project, Task};

/// A cached entity of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// A task.
    Task(Task),
    /// A project.
    Project(Project),
    /// A label.
    Label(Label),
}

impl Entity {
    /// Returns the entity id.
    pub fn id(&self) -> &str {
        match self {
            Entity::Task(t) => &t.id,
            Entity::Project(p) => &p.id,
            Entity::Label(l) => &l.id,
        }
    }

    /// Returns the task, if this is one.
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Entity::Task(t) => Some(t),
            _ => None,
        }
    }
}

/// Positions of entities inside a snapshot, keyed by id.
///
/// Rebuilt from scratch for every published snapshot and never mutated.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    snapshot: Arc<Snapshot>,
    tasks: HashMap<String, usize>,
    projects: HashMap<String, usize>,
    labels: HashMap<String, usize>,
}

impl EntityIndex {
    /// Indexes a snapshot.
    pub fn build(snapshot: Arc<Snapshot>) -> Self {
        let tasks = positions(snapshot.tasks.iter().map(|t| t.id.as_str()));
        let projects = positions(snapshot.projects.iter().map(|p| p.id.as_str()));
        let labels = positions(snapshot.labels.iter().map(|l| l.id.as_str()));
        Self {
            snapshot,
            tasks,
            projects,
            labels,
        }
    }

    /// Returns the indexed snapshot.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Looks up a live task.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id).map(|&i| &self.snapshot.tasks[i])
    }

    /// Looks up a live project.
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id).map(|&i| &self.snapshot.projects[i])
    }

    /// Looks up a live label.
    pub fn label(&self, id: &str) -> Option<&Label> {
        self.labels.get(id).map(|&i| &self.snapshot.labels[i])
    }

    /// Looks up an entity of any kind. Tasks shadow projects and labels.
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.task(id)
            .cloned()
            .map(Entity::Task)
            .or_else(|| self.project(id).cloned().map(Entity::Project))
            .or_else(|| self.label(id).cloned().map(Entity::Label))
    }

    /// Returns the number of indexed entities.
    pub fn len(&self) -> usize {
        self.tasks.len() + self.projects.len() + self.labels.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn positions<'a>(ids: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    ids.enumerate().map(|(i, id)| (id.to_string(), i)).collect()
}
