//! Protocol messages for sync.

use crate::command::Command;
use crate::cursor::{ResourceKind, SyncCursor};
use crate::entity::{coerce_id, Label, Project, SyncEntity, Task};
use crate::error::{DecodeError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Request body sent to the sync endpoint.
///
/// A fetch carries only the cursor and resource list; a command execution
/// also carries the command batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Client cursor.
    pub sync_token: SyncCursor,
    /// Commands to execute, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
    /// Resource kinds to include in the response.
    #[serde(default)]
    pub resource_types: Vec<ResourceKind>,
}

impl SyncRequest {
    /// Creates a fetch request.
    pub fn fetch(cursor: SyncCursor, resources: &[ResourceKind]) -> Self {
        Self {
            sync_token: cursor,
            commands: Vec::new(),
            resource_types: resources.to_vec(),
        }
    }

    /// Creates a command execution request.
    pub fn execute(cursor: SyncCursor, commands: Vec<Command>, resources: &[ResourceKind]) -> Self {
        Self {
            sync_token: cursor,
            commands,
            resource_types: resources.to_vec(),
        }
    }
}

fn decode_list<T: SyncEntity>(map: &Map<String, Value>, field: &str) -> ProtocolResult<Vec<T>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(records)) => records
            .iter()
            .filter(|record| !is_blank(record))
            .map(T::decode)
            .collect(),
        Some(_) => Err(DecodeError::invalid_structure(format!(
            "`{field}` must be an array"
        ))),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Returns a description of an explicit server error carried in a body.
///
/// Bodies with a non-empty `error_code` are errors even when delivered with
/// a success status.
pub fn server_error(body: &Value) -> Option<String> {
    let code = body.get("error_code")?;
    let set = match code {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    };
    if !set {
        return None;
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(format!("error {code}: {message}"))
}

/// Decoded response from the sync endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    /// New cursor to store.
    pub sync_token: SyncCursor,
    /// Whether the response replaces all previous state.
    pub full_sync: bool,
    /// Task records.
    pub tasks: Vec<Task>,
    /// Project records.
    pub projects: Vec<Project>,
    /// Label records.
    pub labels: Vec<Label>,
}

impl SyncResponse {
    /// Creates an empty delta with the given cursor.
    pub fn empty(sync_token: SyncCursor) -> Self {
        Self {
            sync_token,
            full_sync: false,
            tasks: Vec::new(),
            projects: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Decodes a response body.
    pub fn decode(body: &Value) -> ProtocolResult<Self> {
        let map = body
            .as_object()
            .ok_or_else(|| DecodeError::invalid_structure("expected object for sync response"))?;

        let sync_token = map
            .get("sync_token")
            .and_then(Value::as_str)
            .map(SyncCursor::new)
            .ok_or_else(|| DecodeError::missing_field("sync response", "sync_token"))?;

        Ok(Self {
            sync_token,
            full_sync: map.get("full_sync").and_then(Value::as_bool).unwrap_or(false),
            tasks: decode_list(map, "items")?,
            projects: decode_list(map, "projects")?,
            labels: decode_list(map, "labels")?,
        })
    }

    /// Returns true if the response carries a record for the task id.
    pub fn contains_task(&self, id: &str) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }
}

/// A command rejected by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    /// Correlation id of the failed command.
    pub uuid: String,
    /// Error message.
    pub error: Option<String>,
    /// Error code.
    pub error_code: Option<i64>,
    /// Raw status entry.
    pub details: Value,
}

impl CommandFailure {
    fn from_status(uuid: &str, status: &Value) -> Self {
        match status {
            Value::Object(map) => Self {
                uuid: uuid.to_string(),
                error: map.get("error").and_then(Value::as_str).map(str::to_string),
                error_code: map.get("error_code").and_then(Value::as_i64),
                details: status.clone(),
            },
            other => Self {
                uuid: uuid.to_string(),
                error: Some(match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                }),
                error_code: None,
                details: other.clone(),
            },
        }
    }

    /// Returns a short human readable reason.
    pub fn reason(&self) -> String {
        match (&self.error, self.error_code) {
            (Some(error), _) => error.clone(),
            (None, Some(code)) => format!("error code {code}"),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Outcome of a command batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// Resource delta returned with the command results.
    pub sync: SyncResponse,
    /// Correlation ids of commands that succeeded.
    pub succeeded: Vec<String>,
    /// Commands that failed.
    pub failed: Vec<CommandFailure>,
    /// Placeholder id to real id mapping for created entities.
    pub temp_id_mapping: BTreeMap<String, String>,
}

impl CommandResult {
    /// Decodes a command execution response body.
    pub fn decode(body: &Value) -> ProtocolResult<Self> {
        let sync = SyncResponse::decode(body)?;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        if let Some(statuses) = body.get("sync_status").and_then(Value::as_object) {
            for (uuid, status) in statuses {
                match status {
                    Value::String(s) if s == "ok" => succeeded.push(uuid.clone()),
                    other => failed.push(CommandFailure::from_status(uuid, other)),
                }
            }
        }

        let temp_id_mapping = body
            .get("temp_id_mapping")
            .and_then(Value::as_object)
            .map(|mapping| {
                mapping
                    .iter()
                    .filter_map(|(temp, real)| coerce_id(real).map(|real| (temp.clone(), real)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            sync,
            succeeded,
            failed,
            temp_id_mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ItemArgs;
    use serde_json::json;

    #[test]
    fn fetch_request_wire_shape() {
        let request = SyncRequest::fetch(SyncCursor::wildcard(), &ResourceKind::ALL);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"sync_token": "*", "resource_types": ["items", "projects", "labels"]})
        );
    }

    #[test]
    fn execute_request_wire_shape() {
        let command = Command::item_delete("5").with_uuid("u1");
        let request =
            SyncRequest::execute(SyncCursor::new("abc"), vec![command], &[ResourceKind::Items]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sync_token"], json!("abc"));
        assert_eq!(value["commands"][0]["type"], json!("item_delete"));
        assert_eq!(value["resource_types"], json!(["items"]));
    }

    #[test]
    fn request_parses_back() {
        let request = SyncRequest::execute(
            SyncCursor::new("c1"),
            vec![Command::item_add(&ItemArgs::new("a"))],
            &[ResourceKind::Items],
        );
        let text = serde_json::to_string(&request).unwrap();
        let back: SyncRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn response_decoding() {
        let body = json!({
            "sync_token": "tok-2",
            "full_sync": true,
            "items": [{"id": "1", "content": "a"}, null, {}],
            "projects": [{"id": "p", "name": "Inbox"}],
            "labels": null
        });
        let response = SyncResponse::decode(&body).unwrap();
        assert_eq!(response.sync_token.as_str(), "tok-2");
        assert!(response.full_sync);
        assert_eq!(response.tasks.len(), 1);
        assert_eq!(response.projects.len(), 1);
        assert!(response.labels.is_empty());
        assert!(response.contains_task("1"));
        assert!(!response.contains_task("2"));
    }

    #[test]
    fn response_missing_cursor() {
        let err = SyncResponse::decode(&json!({"items": []})).unwrap_err();
        assert_eq!(err, DecodeError::missing_field("sync response", "sync_token"));

        let err = SyncResponse::decode(&json!({"sync_token": 5})).unwrap_err();
        assert_eq!(err, DecodeError::missing_field("sync response", "sync_token"));
    }

    #[test]
    fn response_with_bad_record_fails() {
        let body = json!({"sync_token": "t", "items": [{"content": "no id"}]});
        assert!(SyncResponse::decode(&body).is_err());
    }

    #[test]
    fn response_with_non_array_list_fails() {
        let body = json!({"sync_token": "t", "items": {"id": "1"}});
        assert!(matches!(
            SyncResponse::decode(&body),
            Err(DecodeError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn command_result_decoding() {
        let body = json!({
            "sync_token": "t3",
            "items": [{"id": "900", "content": "new"}],
            "sync_status": {
                "u-ok": "ok",
                "u-bad": {"error": "Item not found", "error_code": 22},
                "u-odd": "weird"
            },
            "temp_id_mapping": {"tmp-1": 900}
        });
        let result = CommandResult::decode(&body).unwrap();
        assert_eq!(result.succeeded, vec!["u-ok".to_string()]);
        assert_eq!(result.failed.len(), 2);

        let bad = result.failed.iter().find(|f| f.uuid == "u-bad").unwrap();
        assert_eq!(bad.error.as_deref(), Some("Item not found"));
        assert_eq!(bad.error_code, Some(22));

        let odd = result.failed.iter().find(|f| f.uuid == "u-odd").unwrap();
        assert_eq!(odd.reason(), "weird");

        assert_eq!(result.temp_id_mapping.get("tmp-1").map(String::as_str), Some("900"));
        assert!(result.temp_id_mapping.get("tmp-2").is_none());
    }

    #[test]
    fn server_error_detection() {
        assert!(server_error(&json!({"sync_token": "t"})).is_none());
        assert!(server_error(&json!({"error_code": null})).is_none());
        assert!(server_error(&json!({"error_code": 0})).is_none());

        let message = server_error(&json!({"error_code": 34, "error": "Invalid sync token"})).unwrap();
        assert!(message.contains("34"));
        assert!(message.contains("Invalid sync token"));
    }
}
