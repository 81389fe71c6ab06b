//! taskmirror CLI
//!
//! Command-line client for a remote task service, backed by the sync engine.
//!
//! # Commands
//!
//! - `sync` - Run a full refresh and print a summary
//! - `tasks` - List mirrored tasks
//! - `add` - Create a task
//! - `update` - Edit a task, optionally closing or reopening it
//! - `complete` / `reopen` / `delete` - Single-task commands

mod commands;

use clap::{Parser, Subcommand};
use commands::{Format, TaskEdit};
use std::time::Duration;
use taskmirror_engine::{SyncConfig, DEFAULT_ENDPOINT};
use tracing_subscriber::EnvFilter;

/// Mirror and edit tasks of a remote task service.
#[derive(Parser)]
#[command(name = "taskmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API token
    #[arg(global = true, long, env = "TASKMIRROR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Sync endpoint URL
    #[arg(global = true, long, env = "TASKMIRROR_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value = "15")]
    timeout: u64,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full refresh and print a summary
    Sync,

    /// List mirrored tasks
    Tasks {
        /// Only show tasks of this project id
        #[arg(short, long)]
        project: Option<String>,

        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },

    /// Create a task
    Add {
        /// Task title
        content: String,

        #[command(flatten)]
        edit: TaskEdit,
    },

    /// Edit a task
    Update {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        content: Option<String>,

        #[command(flatten)]
        edit: TaskEdit,

        /// Mark the task completed
        #[arg(long, conflicts_with = "reopen")]
        close: bool,

        /// Mark the task open again
        #[arg(long)]
        reopen: bool,
    },

    /// Mark a task completed
    Complete {
        /// Task id
        id: String,
    },

    /// Mark a completed task open again
    Reopen {
        /// Task id
        id: String,
    },

    /// Delete a task
    Delete {
        /// Task id
        id: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("taskmirror CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let format = Format::parse(&cli.format)?;
    let token = cli
        .token
        .ok_or("API token required (--token or TASKMIRROR_TOKEN)")?;
    let config = SyncConfig::new(token)
        .with_endpoint(cli.endpoint)
        .with_timeout(Duration::from_secs(cli.timeout));
    let engine = commands::connect(&config)?;

    match cli.command {
        Commands::Sync => commands::sync::run(&engine, format).await?,
        Commands::Tasks { project, all } => {
            commands::tasks::run(&engine, project.as_deref(), all, format).await?;
        }
        Commands::Add { content, edit } => {
            commands::edit::add(&engine, &content, &edit, format).await?;
        }
        Commands::Update {
            id,
            content,
            edit,
            close,
            reopen,
        } => {
            commands::edit::update(&engine, &id, content, &edit, close, reopen, format).await?;
        }
        Commands::Complete { id } => commands::edit::complete(&engine, &id, format).await?,
        Commands::Reopen { id } => commands::edit::reopen(&engine, &id, format).await?,
        Commands::Delete { id } => commands::edit::delete(&engine, &id, format).await?,
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_update_flags() {
        let cli = Cli::try_parse_from([
            "taskmirror",
            "--token",
            "t",
            "update",
            "42",
            "--content",
            "new",
            "--priority",
            "3",
            "--close",
        ])
        .unwrap();

        match cli.command {
            Commands::Update {
                id,
                content,
                edit,
                close,
                reopen,
            } => {
                assert_eq!(id, "42");
                assert_eq!(content.as_deref(), Some("new"));
                assert_eq!(edit.priority, Some(3));
                assert!(close);
                assert!(!reopen);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn close_and_reopen_conflict() {
        let result = Cli::try_parse_from([
            "taskmirror", "update", "42", "--close", "--reopen",
        ]);
        assert!(result.is_err());
    }
}
