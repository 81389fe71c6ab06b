//! Sync command implementation.

use super::{CliResult, Engine, Format};
use serde::Serialize;
use std::time::Instant;
use taskmirror_engine::Snapshot;

/// Summary of a refresh.
#[derive(Debug, Serialize, PartialEq)]
pub struct SyncSummary {
    /// Live tasks.
    pub tasks: usize,
    /// Completed tasks among them.
    pub completed: usize,
    /// Live projects.
    pub projects: usize,
    /// Live labels.
    pub labels: usize,
    /// Snapshot build time (RFC 3339).
    pub last_update: String,
    /// Request duration in milliseconds.
    pub elapsed_ms: u64,
}

impl SyncSummary {
    fn from_snapshot(snapshot: &Snapshot, elapsed_ms: u64) -> Self {
        Self {
            tasks: snapshot.tasks.len(),
            completed: snapshot.tasks.iter().filter(|t| t.is_completed).count(),
            projects: snapshot.projects.len(),
            labels: snapshot.labels.len(),
            last_update: snapshot.last_update.to_rfc3339(),
            elapsed_ms,
        }
    }
}

/// Runs the sync command.
pub async fn run(engine: &Engine, format: Format) -> CliResult {
    let started = Instant::now();
    let snapshot = engine.refresh().await?;
    let summary = SyncSummary::from_snapshot(&snapshot, started.elapsed().as_millis() as u64);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        Format::Text => print_text_output(&summary),
    }
    Ok(())
}

fn print_text_output(summary: &SyncSummary) {
    println!("Sync complete in {} ms", summary.elapsed_ms);
    println!();
    println!("  Tasks:     {} ({} completed)", summary.tasks, summary.completed);
    println!("  Projects:  {}", summary.projects);
    println!("  Labels:    {}", summary.labels);
    println!("  Updated:   {}", summary.last_update);
}
