//! JSON fixtures in the sync wire format.
//!
//! Records are built the way the sync endpoint sends them, so they can
//! seed the reference server or be decoded directly.

use serde_json::{json, Value};

/// Builds a task record without a project.
pub fn task_record(id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "description": "",
        "project_id": null,
        "parent_id": null,
        "checked": false,
        "labels": [],
        "priority": 1,
        "child_order": 0,
        "due": null,
        "is_deleted": false,
    })
}

/// Builds a task record placed in a project.
pub fn task_in_project(id: &str, content: &str, project_id: &str, order: i64) -> Value {
    let mut record = task_record(id, content);
    record["project_id"] = json!(project_id);
    record["child_order"] = json!(order);
    record
}

/// Builds a project record.
pub fn project_record(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "parent_id": null,
        "color": "grey",
        "child_order": 0,
        "is_deleted": false,
        "is_archived": false,
    })
}

/// Builds a label record.
pub fn label_record(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "color": "charcoal",
        "item_order": 0,
        "is_deleted": false,
        "is_favorite": false,
    })
}

/// Returns the record with `is_archived` set.
pub fn archived(mut record: Value) -> Value {
    record["is_archived"] = json!(true);
    record
}

/// Returns the record with `is_deleted` set.
pub fn deleted(mut record: Value) -> Value {
    record["is_deleted"] = json!(true);
    record
}

/// Returns the record with `checked` set.
pub fn completed(mut record: Value) -> Value {
    record["checked"] = json!(true);
    record
}

/// Builds a full-sync response body carrying tasks only.
pub fn full_response(cursor: &str, items: Vec<Value>) -> Value {
    json!({
        "sync_token": cursor,
        "full_sync": true,
        "items": items,
        "projects": [],
        "labels": [],
    })
}

/// Builds a delta response body carrying tasks only.
pub fn delta_response(cursor: &str, items: Vec<Value>) -> Value {
    json!({
        "sync_token": cursor,
        "full_sync": false,
        "items": items,
    })
}

/// Builds a command response body.
///
/// `statuses` pairs command uuids with either `"ok"` or an error object.
pub fn command_response(
    cursor: &str,
    items: Vec<Value>,
    statuses: &[(&str, Value)],
    temp_ids: &[(&str, &str)],
) -> Value {
    let sync_status: serde_json::Map<String, Value> = statuses
        .iter()
        .map(|(uuid, status)| ((*uuid).to_string(), status.clone()))
        .collect();
    let mapping: serde_json::Map<String, Value> = temp_ids
        .iter()
        .map(|(temp, real)| ((*temp).to_string(), json!(real)))
        .collect();

    json!({
        "sync_token": cursor,
        "full_sync": false,
        "items": items,
        "sync_status": sync_status,
        "temp_id_mapping": mapping,
    })
}

/// Builds a failed command status.
pub fn command_error(code: i64, message: &str) -> Value {
    json!({"error": message, "error_code": code})
}

/// Three tasks in two projects, the middle one archived.
pub fn mixed_tasks() -> Vec<Value> {
    vec![
        task_in_project("2", "Write report", "p2", 1),
        archived(task_in_project("3", "Old chore", "p1", 0)),
        task_in_project("1", "Buy milk", "p1", 5),
    ]
}
