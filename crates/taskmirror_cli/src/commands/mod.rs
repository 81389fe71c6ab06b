//! CLI command implementations.

pub mod edit;
pub mod sync;
pub mod tasks;

use chrono::NaiveDate;
use clap::Args;
use taskmirror_engine::{HttpTransport, ReqwestClient, SyncConfig, SyncEngine};
use taskmirror_protocol::ItemArgs;

/// The engine used by every command.
pub type Engine = SyncEngine<HttpTransport<ReqwestClient>>;

/// Result type of command implementations.
pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Builds an engine talking to the configured endpoint.
pub fn connect(config: &SyncConfig) -> CliResult<Engine> {
    config.validate()?;
    let client = ReqwestClient::new(config)?;
    let transport = HttpTransport::new(config, client);
    Ok(SyncEngine::new(config, transport))
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a format name.
    pub fn parse(name: &str) -> CliResult<Self> {
        match name {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown output format: {other}").into()),
        }
    }
}

/// Task fields shared by `add` and `update`.
#[derive(Args, Debug, Default)]
pub struct TaskEdit {
    /// Description
    #[arg(long)]
    pub description: Option<String>,

    /// Project id
    #[arg(long)]
    pub project: Option<String>,

    /// Parent task id
    #[arg(long)]
    pub parent: Option<String>,

    /// Label name (repeatable)
    #[arg(long = "label")]
    pub labels: Vec<String>,

    /// Priority, 1 (normal) to 4 (urgent)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,

    /// Natural language due, e.g. "every monday"
    #[arg(long, conflicts_with = "due_date")]
    pub due: Option<String>,

    /// All-day due date (YYYY-MM-DD)
    #[arg(long)]
    pub due_date: Option<String>,
}

impl TaskEdit {
    /// Builds command arguments, with an optional new title.
    pub fn to_args(&self, content: Option<String>) -> CliResult<ItemArgs> {
        let mut args = ItemArgs {
            content,
            description: self.description.clone(),
            project_id: self.project.clone(),
            parent_id: self.parent.clone(),
            priority: self.priority,
            due_string: self.due.clone(),
            ..ItemArgs::default()
        };
        if !self.labels.is_empty() {
            args.labels = Some(self.labels.clone());
        }
        if let Some(date) = &self.due_date {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("invalid due date {date:?}: {e}"))?;
            args.due_date = Some(date);
        }
        Ok(args)
    }
}
