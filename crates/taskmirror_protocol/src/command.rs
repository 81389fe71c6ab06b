//! Sync commands.
//!
//! A command is a client-issued mutation submitted as part of a batch. Each
//! command carries a correlation `uuid`; create commands also carry a
//! `temp_id` that the server maps to the real id in its response.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Generates a fresh command correlation id.
pub fn new_command_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generates a fresh placeholder id for a create command.
pub fn new_temp_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Type of a sync command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Create a task.
    ItemAdd,
    /// Update mutable task fields.
    ItemUpdate,
    /// Mark a task completed.
    ItemComplete,
    /// Mark a task not completed.
    ItemUncomplete,
    /// Delete a task.
    ItemDelete,
}

impl CommandKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ItemAdd => "item_add",
            CommandKind::ItemUpdate => "item_update",
            CommandKind::ItemComplete => "item_complete",
            CommandKind::ItemUncomplete => "item_uncomplete",
            CommandKind::ItemDelete => "item_delete",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command type.
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Correlation id; assigned before sending when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Placeholder id for created entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Command arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Command {
    /// Creates a command from raw arguments.
    pub fn new(kind: CommandKind, args: Map<String, Value>) -> Self {
        Self {
            kind,
            uuid: None,
            temp_id: None,
            args,
        }
    }

    /// Creates an `item_add` command with a fresh temp id.
    pub fn item_add(args: &ItemArgs) -> Self {
        let mut command = Self::new(CommandKind::ItemAdd, args.to_args());
        command.temp_id = Some(new_temp_id());
        command
    }

    /// Creates an `item_update` command.
    pub fn item_update(id: impl Into<String>, args: &ItemArgs) -> Self {
        let mut map = args.to_args();
        map.insert("id".into(), Value::String(id.into()));
        Self::new(CommandKind::ItemUpdate, map)
    }

    /// Creates an `item_complete` command.
    pub fn item_complete(id: impl Into<String>) -> Self {
        Self::targeting(CommandKind::ItemComplete, id)
    }

    /// Creates an `item_uncomplete` command.
    pub fn item_uncomplete(id: impl Into<String>) -> Self {
        Self::targeting(CommandKind::ItemUncomplete, id)
    }

    /// Creates an `item_delete` command.
    pub fn item_delete(id: impl Into<String>) -> Self {
        Self::targeting(CommandKind::ItemDelete, id)
    }

    fn targeting(kind: CommandKind, id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(id.into()));
        Self::new(kind, map)
    }

    /// Sets the correlation id.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Sets the temp id.
    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }
}

fn serialize_utc<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => s.serialize_none(),
    }
}

/// Arguments for creating or updating a task.
///
/// Only fields that are set are sent; unset fields are left untouched by
/// `item_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemArgs {
    /// Title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Parent task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Label names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    /// Priority (1-4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Natural language due, e.g. "every monday".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
    /// All-day due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Fixed-time due, always sent in UTC.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_utc"
    )]
    pub due_datetime: Option<DateTime<Utc>>,
}

impl ItemArgs {
    /// Creates arguments with a title.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Sets the title.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Sets the parent task.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets a natural language due.
    pub fn with_due_string(mut self, due: impl Into<String>) -> Self {
        self.due_string = Some(due.into());
        self
    }

    /// Sets an all-day due date.
    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    /// Sets a fixed-time due, converted to UTC.
    pub fn with_due_datetime<Tz: TimeZone>(mut self, at: DateTime<Tz>) -> Self {
        self.due_datetime = Some(at.with_timezone(&Utc));
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Renders the set fields as a wire argument map.
    pub fn to_args(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
