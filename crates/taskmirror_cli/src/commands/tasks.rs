//! Tasks command implementation.

use super::{CliResult, Engine, Format};
use serde::Serialize;
use taskmirror_engine::Snapshot;
use taskmirror_protocol::Task;

/// A task as printed by the CLI.
#[derive(Debug, Serialize, PartialEq)]
pub struct TaskRow {
    /// Task id.
    pub id: String,
    /// Title.
    pub content: String,
    /// Project name, or id if the project is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Completion flag.
    pub completed: bool,
    /// Priority (1-4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Due text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    /// Label names, or ids for unknown labels.
    pub labels: Vec<String>,
}

impl TaskRow {
    /// Builds a row, resolving project and label names against the snapshot.
    pub fn new(task: &Task, snapshot: &Snapshot) -> Self {
        let project = task.project_id.as_deref().map(|id| {
            snapshot
                .project(id)
                .map_or_else(|| id.to_string(), |p| p.name.clone())
        });
        let labels = task
            .label_ids
            .iter()
            .map(|id| {
                snapshot
                    .label(id)
                    .map_or_else(|| id.clone(), |l| l.name.clone())
            })
            .collect();
        let due = task.due.as_ref().and_then(|due| {
            due.calendar_date()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .or_else(|| due.string.clone())
        });

        Self {
            id: task.id.clone(),
            content: task.content.clone(),
            project,
            completed: task.is_completed,
            priority: task.priority,
            due,
            labels,
        }
    }

    fn to_line(&self) -> String {
        let mut line = format!(
            "[{}] {:<10} {}",
            if self.completed { "x" } else { " " },
            self.id,
            self.content
        );
        if let Some(project) = &self.project {
            line.push_str(&format!("  #{project}"));
        }
        for label in &self.labels {
            line.push_str(&format!(" @{label}"));
        }
        if let Some(priority) = self.priority.filter(|p| *p > 1) {
            line.push_str(&format!("  p{priority}"));
        }
        if let Some(due) = &self.due {
            line.push_str(&format!("  due {due}"));
        }
        line
    }
}

/// Selects the rows to print, in snapshot order.
pub fn select(snapshot: &Snapshot, project: Option<&str>, include_completed: bool) -> Vec<TaskRow> {
    match project {
        Some(project) => rows(snapshot.tasks_in_project(project), snapshot, include_completed),
        None => rows(snapshot.tasks.iter(), snapshot, include_completed),
    }
}

fn rows<'a>(
    tasks: impl Iterator<Item = &'a Task>,
    snapshot: &Snapshot,
    include_completed: bool,
) -> Vec<TaskRow> {
    tasks
        .filter(|task| include_completed || !task.is_completed)
        .map(|task| TaskRow::new(task, snapshot))
        .collect()
}

/// Runs the tasks command.
pub async fn run(
    engine: &Engine,
    project: Option<&str>,
    include_completed: bool,
    format: Format,
) -> CliResult {
    let snapshot = engine.refresh().await?;
    let rows = select(&snapshot, project, include_completed);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        Format::Text => {
            if rows.is_empty() {
                println!("No tasks.");
            }
            for row in &rows {
                println!("{}", row.to_line());
            }
        }
    }
    Ok(())
}
