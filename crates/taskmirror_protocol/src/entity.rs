//! Entity value objects and their decoders.
//!
//! Decoders are pure and total over well-shaped records: every optional
//! field has a default, only `id` is required.

use crate::error::{DecodeError, ProtocolResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Common behavior of the mirrored entity kinds.
pub trait SyncEntity: Clone + Sized {
    /// Record name used in decode errors.
    const RECORD: &'static str;

    /// Decodes a raw wire record.
    fn decode(value: &Value) -> ProtocolResult<Self>;

    /// Returns the server-assigned identifier.
    fn id(&self) -> &str;

    /// Returns true if the entity must not appear in a published snapshot.
    fn is_removed(&self) -> bool;
}

/// Normalizes an identifier-like value to a string.
///
/// Servers may send ids as JSON strings or numbers; both map to the same
/// string form. Any other value yields `None`.
pub fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_record<'a>(value: &'a Value, record: &'static str) -> ProtocolResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| DecodeError::invalid_structure(format!("expected object for {record}")))
}

fn present<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).filter(|v| !v.is_null())
}

fn required_id(
    map: &Map<String, Value>,
    record: &'static str,
    field: &'static str,
) -> ProtocolResult<String> {
    let value = present(map, field).ok_or_else(|| DecodeError::missing_field(record, field))?;
    coerce_id(value)
        .ok_or_else(|| DecodeError::invalid_field(record, field, "expected string or number"))
}

fn optional_id(map: &Map<String, Value>, field: &str) -> Option<String> {
    present(map, field).and_then(coerce_id)
}

fn optional_text(map: &Map<String, Value>, field: &str) -> Option<String> {
    present(map, field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn flag(map: &Map<String, Value>, field: &str) -> bool {
    match present(map, field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn integer(map: &Map<String, Value>, field: &str) -> Option<i64> {
    match present(map, field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First present integer among field aliases.
fn integer_of(map: &Map<String, Value>, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|field| integer(map, field))
}

fn id_list(map: &Map<String, Value>, field: &str) -> Option<BTreeSet<String>> {
    present(map, field)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(coerce_id).collect())
}

/// Due information attached to a task.
///
/// At most one of `date` / `datetime` is meaningful: when `datetime` is set
/// the calendar date is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Due {
    /// Calendar date (`YYYY-MM-DD`).
    pub date: Option<String>,
    /// Timestamp, with an offset for fixed-time dues or floating otherwise.
    pub datetime: Option<String>,
    /// IANA timezone name for fixed-time dues.
    pub timezone: Option<String>,
    /// Human readable form, including recurrence rules.
    pub string: Option<String>,
    /// Whether the due recurs.
    pub is_recurring: bool,
}

impl Due {
    /// Decodes a due object. Null, absent or empty objects have no due.
    pub fn decode(value: &Value) -> Option<Self> {
        let map = value.as_object().filter(|m| !m.is_empty())?;
        Some(Self {
            date: optional_text(map, "date"),
            datetime: optional_text(map, "datetime"),
            timezone: optional_text(map, "timezone"),
            string: optional_text(map, "string"),
            is_recurring: flag(map, "is_recurring"),
        })
    }

    /// Returns the calendar date, derived from `datetime` when present.
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        let raw = self.datetime.as_deref().or(self.date.as_deref())?;
        let day = raw.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    /// Returns the instant for timestamps that carry an offset.
    ///
    /// Floating timestamps (no offset) have no fixed instant.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let raw = self.datetime.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Returns true if the due has a date but no time of day.
    pub fn is_all_day(&self) -> bool {
        self.datetime.is_none() && self.date.is_some()
    }
}

/// A task (an "item" on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: String,
    /// Owning project.
    pub project_id: Option<String>,
    /// Parent task for subtasks.
    pub parent_id: Option<String>,
    /// Title.
    pub content: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Completion flag.
    pub is_completed: bool,
    /// Attached label ids.
    pub label_ids: BTreeSet<String>,
    /// Priority (1 = normal, 4 = urgent).
    pub priority: Option<u8>,
    /// Rank within the project.
    pub order: i64,
    /// Due information.
    pub due: Option<Due>,
    /// Deleted on the server.
    pub is_deleted: bool,
    /// Archived on the server.
    pub is_archived: bool,
}

impl Task {
    /// Creates a visible task with only the required fields set.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: None,
            parent_id: None,
            content: content.into(),
            description: None,
            is_completed: false,
            label_ids: BTreeSet::new(),
            priority: None,
            order: 0,
            due: None,
            is_deleted: false,
            is_archived: false,
        }
    }

    /// Returns the display sort key: `(project_id, order, id)`.
    pub fn sort_key(&self) -> (&str, i64, &str) {
        (
            self.project_id.as_deref().unwrap_or(""),
            self.order,
            self.id.as_str(),
        )
    }
}

impl SyncEntity for Task {
    const RECORD: &'static str = "task";

    fn decode(value: &Value) -> ProtocolResult<Self> {
        let map = as_record(value, Self::RECORD)?;
        let label_ids = id_list(map, "label_ids")
            .or_else(|| id_list(map, "labels"))
            .unwrap_or_default();

        Ok(Self {
            id: required_id(map, Self::RECORD, "id")?,
            project_id: optional_id(map, "project_id"),
            parent_id: optional_id(map, "parent_id"),
            content: optional_text(map, "content").unwrap_or_default(),
            description: optional_text(map, "description"),
            is_completed: flag(map, "checked") || flag(map, "completed") || flag(map, "is_completed"),
            label_ids,
            priority: integer(map, "priority").and_then(|p| u8::try_from(p).ok()),
            order: integer_of(map, &["item_order", "child_order"]).unwrap_or(0),
            due: map.get("due").and_then(Due::decode),
            is_deleted: flag(map, "is_deleted"),
            is_archived: flag(map, "is_archived"),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_removed(&self) -> bool {
        self.is_deleted || self.is_archived
    }
}

/// A project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent project.
    pub parent_id: Option<String>,
    /// Color name.
    pub color: Option<String>,
    /// Rank among siblings.
    pub order: i64,
    /// Deleted on the server.
    pub is_deleted: bool,
    /// Archived on the server.
    pub is_archived: bool,
}

impl Project {
    /// Creates a visible project.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            color: None,
            order: 0,
            is_deleted: false,
            is_archived: false,
        }
    }
}

impl SyncEntity for Project {
    const RECORD: &'static str = "project";

    fn decode(value: &Value) -> ProtocolResult<Self> {
        let map = as_record(value, Self::RECORD)?;
        Ok(Self {
            id: required_id(map, Self::RECORD, "id")?,
            name: optional_text(map, "name").unwrap_or_default(),
            parent_id: optional_id(map, "parent_id"),
            color: optional_text(map, "color"),
            order: integer_of(map, &["order", "child_order"]).unwrap_or(0),
            is_deleted: flag(map, "is_deleted"),
            is_archived: flag(map, "is_archived"),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_removed(&self) -> bool {
        self.is_deleted || self.is_archived
    }
}

/// A personal label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Color name.
    pub color: Option<String>,
    /// Rank in the label list.
    pub order: i64,
    /// Deleted on the server.
    pub is_deleted: bool,
    /// Marked as favorite.
    pub is_favorite: bool,
}

impl Label {
    /// Creates a visible label.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            order: 0,
            is_deleted: false,
            is_favorite: false,
        }
    }
}

impl SyncEntity for Label {
    const RECORD: &'static str = "label";

    fn decode(value: &Value) -> ProtocolResult<Self> {
        let map = as_record(value, Self::RECORD)?;
        Ok(Self {
            id: required_id(map, Self::RECORD, "id")?,
            name: optional_text(map, "name").unwrap_or_default(),
            color: optional_text(map, "color"),
            order: integer_of(map, &["item_order", "order"]).unwrap_or(0),
            is_deleted: flag(map, "is_deleted"),
            is_favorite: flag(map, "is_favorite"),
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_removed(&self) -> bool {
        self.is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_minimal_record() {
        let task = Task::decode(&json!({"id": "42"})).unwrap();
        assert_eq!(task, Task::new("42", ""));
    }

    #[test]
    fn task_full_record() {
        let task = Task::decode(&json!({
            "id": 7,
            "project_id": 100,
            "parent_id": "6",
            "content": "Water plants",
            "description": "balcony",
            "checked": true,
            "label_ids": [1, "2", null],
            "priority": 4,
            "item_order": 3,
            "due": {"date": "2024-05-01", "string": "every day", "is_recurring": true},
            "is_deleted": false,
            "is_archived": 0
        }))
        .unwrap();

        assert_eq!(task.id, "7");
        assert_eq!(task.project_id.as_deref(), Some("100"));
        assert_eq!(task.parent_id.as_deref(), Some("6"));
        assert_eq!(task.content, "Water plants");
        assert_eq!(task.description.as_deref(), Some("balcony"));
        assert!(task.is_completed);
        assert_eq!(
            task.label_ids.iter().cloned().collect::<Vec<_>>(),
            vec!["1".to_string(), "2".to_string()]
        );
        assert_eq!(task.priority, Some(4));
        assert_eq!(task.order, 3);
        let due = task.due.unwrap();
        assert!(due.is_recurring);
        assert_eq!(due.string.as_deref(), Some("every day"));
        assert!(!task.is_archived);
    }

    #[test]
    fn task_missing_id_is_an_error() {
        let err = Task::decode(&json!({"content": "no id"})).unwrap_err();
        assert_eq!(err, DecodeError::missing_field("task", "id"));

        let err = Task::decode(&json!({"id": null})).unwrap_err();
        assert_eq!(err, DecodeError::missing_field("task", "id"));
    }

    #[test]
    fn task_with_unusable_id_is_an_error() {
        let err = Task::decode(&json!({"id": ["1"]})).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "id", .. }));
    }

    #[test]
    fn non_object_record_is_an_error() {
        let err = Project::decode(&json!("p1")).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidStructure { .. }));
    }

    #[test]
    fn task_completion_aliases() {
        assert!(Task::decode(&json!({"id": "1", "completed": true})).unwrap().is_completed);
        assert!(Task::decode(&json!({"id": "1", "is_completed": true})).unwrap().is_completed);
        assert!(!Task::decode(&json!({"id": "1", "checked": false})).unwrap().is_completed);
    }

    #[test]
    fn task_labels_alias_and_child_order() {
        let task = Task::decode(&json!({"id": "1", "labels": ["home"], "child_order": 9})).unwrap();
        assert!(task.label_ids.contains("home"));
        assert_eq!(task.order, 9);
    }

    #[test]
    fn priority_out_of_range_is_dropped() {
        let task = Task::decode(&json!({"id": "1", "priority": 900})).unwrap();
        assert_eq!(task.priority, None);
    }

    #[test]
    fn numeric_and_string_ids_normalize_identically() {
        let a = Task::decode(&json!({"id": 12, "project_id": 5})).unwrap();
        let b = Task::decode(&json!({"id": "12", "project_id": "5"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn project_record() {
        let project = Project::decode(&json!({
            "id": "p1",
            "name": "Inbox",
            "color": "grey",
            "order": 2,
            "is_archived": true
        }))
        .unwrap();
        assert_eq!(project.name, "Inbox");
        assert_eq!(project.order, 2);
        assert!(project.is_removed());
        assert!(!project.is_deleted);
    }

    #[test]
    fn label_record() {
        let label = Label::decode(&json!({
            "id": 3,
            "name": "errand",
            "item_order": 1,
            "is_favorite": true
        }))
        .unwrap();
        assert_eq!(label.id, "3");
        assert_eq!(label.order, 1);
        assert!(label.is_favorite);
        assert!(!label.is_removed());
    }

    #[test]
    fn empty_due_is_none() {
        assert_eq!(Due::decode(&json!({})), None);
        assert_eq!(Due::decode(&Value::Null), None);
    }

    #[test]
    fn due_date_only() {
        let due = Due::decode(&json!({"date": "2024-02-29"})).unwrap();
        assert!(due.is_all_day());
        assert_eq!(due.calendar_date(), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(due.instant(), None);
    }

    #[test]
    fn due_datetime_derives_calendar_date() {
        let due = Due::decode(&json!({
            "date": "2024-03-01",
            "datetime": "2024-03-02T08:30:00Z",
            "timezone": "Europe/Oslo"
        }))
        .unwrap();
        assert!(!due.is_all_day());
        assert_eq!(due.calendar_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
        let instant = due.instant().unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-03-02T08:30:00+00:00");
    }

    #[test]
    fn floating_datetime_has_no_instant() {
        let due = Due::decode(&json!({"datetime": "2024-03-02T08:30:00"})).unwrap();
        assert_eq!(due.instant(), None);
        assert_eq!(due.calendar_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
    }

    #[test]
    fn sort_key_treats_missing_project_as_empty() {
        let mut task = Task::new("b", "x");
        task.order = 2;
        assert_eq!(task.sort_key(), ("", 2, "b"));
    }
}
