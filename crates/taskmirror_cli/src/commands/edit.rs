//! Task editing commands.

use super::tasks::TaskRow;
use super::{CliResult, Engine, Format, TaskEdit};
use serde_json::json;
use taskmirror_engine::CommandOutcome;

/// Creates a task and prints it.
pub async fn add(engine: &Engine, content: &str, edit: &TaskEdit, format: Format) -> CliResult {
    let args = edit.to_args(Some(content.to_string()))?;
    let task = engine
        .add_task(&args)
        .await?
        .ok_or("task was created but is missing from the returned delta")?;

    let snapshot = engine
        .current_snapshot()
        .ok_or("no snapshot published after add")?;
    let row = TaskRow::new(&task, &snapshot);
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&row)?),
        Format::Text => println!("Created task {}: {}", row.id, row.content),
    }
    Ok(())
}

/// Edits a task.
pub async fn update(
    engine: &Engine,
    id: &str,
    content: Option<String>,
    edit: &TaskEdit,
    close: bool,
    reopen: bool,
    format: Format,
) -> CliResult {
    let args = edit.to_args(content)?;
    match engine.update_task(id, &args, close, reopen).await? {
        Some(outcome) => report(id, "Updated", &outcome, format),
        None => {
            println!("Nothing to update.");
            Ok(())
        }
    }
}

/// Marks a task completed.
pub async fn complete(engine: &Engine, id: &str, format: Format) -> CliResult {
    let outcome = engine.close_task(id).await?;
    report(id, "Completed", &outcome, format)
}

/// Marks a task open again.
pub async fn reopen(engine: &Engine, id: &str, format: Format) -> CliResult {
    let outcome = engine.reopen_task(id).await?;
    report(id, "Reopened", &outcome, format)
}

/// Deletes a task.
pub async fn delete(engine: &Engine, id: &str, format: Format) -> CliResult {
    let outcome = engine.delete_task(id).await?;
    report(id, "Deleted", &outcome, format)
}

fn report(id: &str, verb: &str, outcome: &CommandOutcome, format: Format) -> CliResult {
    match format {
        Format::Json => {
            let task = outcome
                .snapshot
                .task(id)
                .map(|task| TaskRow::new(task, &outcome.snapshot));
            let body = json!({
                "id": id,
                "commands": outcome.succeeded.len(),
                "task": task,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Format::Text => println!("{verb} task {id}"),
    }
    Ok(())
}
