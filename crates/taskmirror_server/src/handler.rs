//! Request handler for the sync endpoint.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{merge_fields, ServerStore};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use taskmirror_protocol::{
    coerce_id, Command, CommandKind, ResourceKind, SyncRequest, RESET_CURSOR,
};
use tracing::debug;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Entity store (shared across all handlers).
    pub store: Arc<ServerStore>,
    auth: Authenticator,
    /// Statuses of processed commands, keyed by uuid.
    processed: Mutex<HashMap<String, Value>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<ServerStore>) -> Self {
        let auth = Authenticator::new(
            config.require_auth,
            config.auth_secret.clone(),
            config.static_tokens.clone(),
        );
        Self {
            config,
            store,
            auth,
            processed: Mutex::new(HashMap::new()),
        }
    }
}

/// A rejected command.
#[derive(Debug, Clone, PartialEq)]
struct CommandError {
    code: i64,
    message: String,
}

impl CommandError {
    fn missing(argument: &str) -> Self {
        Self {
            code: 19,
            message: format!("Argument {argument} missing"),
        }
    }

    fn not_found() -> Self {
        Self {
            code: 22,
            message: "Item not found".into(),
        }
    }

    fn to_status(&self) -> Value {
        json!({"error": self.message, "error_code": self.code})
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Authenticates and handles a raw request body.
    pub fn handle(&self, bearer: &str, body: &str) -> ServerResult<Value> {
        self.context.auth.check(bearer)?;
        let request: SyncRequest = serde_json::from_str(body)
            .map_err(|e| ServerError::InvalidRequest(format!("malformed request body: {e}")))?;
        self.handle_request(request)
    }

    /// Handles a decoded request.
    ///
    /// Unknown cursors get a `RESET` response and no command is applied.
    pub fn handle_request(&self, request: SyncRequest) -> ServerResult<Value> {
        let max = self.context.config.max_commands;
        if request.commands.len() > max {
            return Err(ServerError::TooManyCommands {
                count: request.commands.len(),
                max,
            });
        }

        let store = &self.context.store;
        let since = if request.sync_token.is_wildcard() {
            None
        } else {
            match store.parse_cursor(request.sync_token.as_str()) {
                Some(seq) => Some(seq),
                None => {
                    debug!("unknown sync token, asking client to reset");
                    return Ok(json!({"sync_token": RESET_CURSOR, "full_sync": true}));
                }
            }
        };

        let mut statuses = Map::new();
        let mut temp_ids: HashMap<String, String> = HashMap::new();
        for command in &request.commands {
            let uuid = command
                .uuid
                .clone()
                .ok_or_else(|| ServerError::InvalidRequest("command without uuid".into()))?;
            if statuses.contains_key(&uuid) {
                return Err(ServerError::InvalidRequest(format!(
                    "duplicate command uuid {uuid}"
                )));
            }

            let replayed = self.context.processed.lock().get(&uuid).cloned();
            let status = match replayed {
                Some(status) => status,
                None => {
                    let status = match self.apply(command, &mut temp_ids) {
                        Ok(()) => Value::String("ok".into()),
                        Err(err) => err.to_status(),
                    };
                    self.context
                        .processed
                        .lock()
                        .insert(uuid.clone(), status.clone());
                    status
                }
            };
            statuses.insert(uuid, status);
        }

        let mut body = Map::new();
        body.insert("sync_token".into(), Value::String(store.cursor()));
        body.insert("full_sync".into(), Value::Bool(since.is_none()));
        for kind in &request.resource_types {
            let records = match since {
                Some(seq) => store.changes_since(seq, *kind),
                None => store.live(*kind),
            };
            body.insert(kind.as_str().into(), Value::Array(records));
        }

        if !request.commands.is_empty() {
            let mapping = temp_ids
                .into_iter()
                .map(|(temp, real)| (temp, Value::String(real)))
                .collect();
            body.insert("sync_status".into(), Value::Object(statuses));
            body.insert("temp_id_mapping".into(), Value::Object(mapping));
        }

        debug!(
            commands = request.commands.len(),
            full_sync = since.is_none(),
            "sync request handled"
        );
        Ok(Value::Object(body))
    }

    fn apply(
        &self,
        command: &Command,
        temp_ids: &mut HashMap<String, String>,
    ) -> Result<(), CommandError> {
        let store = &self.context.store;
        let args = resolve_temp_ids(&command.args, temp_ids);

        match command.kind {
            CommandKind::ItemAdd => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| CommandError::missing("content"))?;

                let id = store.allocate_id();
                let order = store.count(ResourceKind::Items) as i64 + 1;
                let mut record = json!({
                    "id": id,
                    "content": content,
                    "description": "",
                    "project_id": null,
                    "parent_id": null,
                    "checked": false,
                    "labels": [],
                    "priority": 1,
                    "child_order": order,
                    "due": null,
                    "is_deleted": false,
                });
                merge_fields(&mut record, &item_fields(&args));
                store.upsert(ResourceKind::Items, record);

                if let Some(temp_id) = &command.temp_id {
                    temp_ids.insert(temp_id.clone(), id);
                }
                Ok(())
            }
            CommandKind::ItemUpdate => {
                let (id, mut record) = self.live_item(&args)?;
                merge_fields(&mut record, &item_fields(&args));
                store.upsert(ResourceKind::Items, record);
                debug!(task_id = %id, "item updated");
                Ok(())
            }
            CommandKind::ItemComplete => self.set_flag(&args, "checked", true),
            CommandKind::ItemUncomplete => self.set_flag(&args, "checked", false),
            CommandKind::ItemDelete => self.set_flag(&args, "is_deleted", true),
        }
    }

    fn live_item(&self, args: &Map<String, Value>) -> Result<(String, Value), CommandError> {
        let id = args
            .get("id")
            .and_then(coerce_id)
            .ok_or_else(|| CommandError::missing("id"))?;
        let store = &self.context.store;
        if !store.is_live(ResourceKind::Items, &id) {
            return Err(CommandError::not_found());
        }
        let record = store
            .get(ResourceKind::Items, &id)
            .ok_or_else(CommandError::not_found)?;
        Ok((id, record))
    }

    fn set_flag(
        &self,
        args: &Map<String, Value>,
        flag: &str,
        value: bool,
    ) -> Result<(), CommandError> {
        let (_, mut record) = self.live_item(args)?;
        let mut patch = Map::new();
        patch.insert(flag.into(), Value::Bool(value));
        merge_fields(&mut record, &patch);
        self.context.store.upsert(ResourceKind::Items, record);
        Ok(())
    }
}

/// Replaces temp ids created earlier in the batch with real ids.
fn resolve_temp_ids(args: &Map<String, Value>, temp_ids: &HashMap<String, String>) -> Map<String, Value> {
    let mut resolved = args.clone();
    for key in ["id", "project_id", "parent_id"] {
        if let Some(real) = args
            .get(key)
            .and_then(Value::as_str)
            .and_then(|temp| temp_ids.get(temp))
        {
            resolved.insert(key.into(), Value::String(real.clone()));
        }
    }
    resolved
}

/// Maps command arguments to stored item fields.
fn item_fields(args: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();
    for key in ["content", "description", "project_id", "parent_id", "labels", "priority"] {
        if let Some(value) = args.get(key) {
            fields.insert(key.into(), value.clone());
        }
    }

    let due = if let Some(datetime) = args.get("due_datetime").and_then(Value::as_str) {
        Some(json!({
            "date": datetime.get(..10).unwrap_or(datetime),
            "datetime": datetime,
            "string": datetime,
            "is_recurring": false,
        }))
    } else if let Some(date) = args.get("due_date").and_then(Value::as_str) {
        Some(json!({"date": date, "string": date, "is_recurring": false}))
    } else {
        args.get("due_string").and_then(Value::as_str).map(|text| {
            json!({
                "date": null,
                "string": text,
                "is_recurring": text.starts_with("every"),
            })
        })
    };
    if let Some(due) = due {
        fields.insert("due".into(), due);
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmirror_protocol::{ItemArgs, SyncCursor};

    fn create_handler() -> RequestHandler {
        let config = ServerConfig::default();
        let store = Arc::new(ServerStore::new());
        let context = Arc::new(HandlerContext::new(config, store));
        RequestHandler::new(context)
    }

    fn store(handler: &RequestHandler) -> &ServerStore {
        &handler.context.store
    }

    fn fetch(handler: &RequestHandler, cursor: &str) -> Value {
        handler
            .handle_request(SyncRequest::fetch(
                SyncCursor::new(cursor),
                &ResourceKind::ALL,
            ))
            .unwrap()
    }

    fn execute(handler: &RequestHandler, cursor: &str, commands: Vec<Command>) -> Value {
        handler
            .handle_request(SyncRequest::execute(
                SyncCursor::new(cursor),
                commands,
                &[ResourceKind::Items],
            ))
            .unwrap()
    }

    #[test]
    fn wildcard_fetch_is_full_sync() {
        let handler = create_handler();
        store(&handler).upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));
        store(&handler).upsert(ResourceKind::Items, json!({"id": "2", "is_deleted": true}));

        let body = fetch(&handler, "*");
        assert_eq!(body["full_sync"], true);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["projects"], json!([]));
        assert!(body.get("sync_status").is_none());
    }

    #[test]
    fn delta_fetch_returns_changes_only() {
        let handler = create_handler();
        store(&handler).upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));
        let first = fetch(&handler, "*");
        let cursor = first["sync_token"].as_str().unwrap().to_string();

        store(&handler).upsert(ResourceKind::Items, json!({"id": "2", "content": "b"}));
        let body = fetch(&handler, &cursor);
        assert_eq!(body["full_sync"], false);
        assert_eq!(body["items"], json!([{"id": "2", "content": "b"}]));
        assert_ne!(body["sync_token"], first["sync_token"]);
    }

    #[test]
    fn unknown_cursor_gets_reset() {
        let handler = create_handler();
        let body = execute(
            &handler,
            "bogus",
            vec![Command::item_add(&ItemArgs::new("x")).with_uuid("u1")],
        );
        assert_eq!(body["sync_token"], RESET_CURSOR);
        assert_eq!(store(&handler).count(ResourceKind::Items), 0);
    }

    #[test]
    fn add_maps_temp_id() {
        let handler = create_handler();
        let command = Command::item_add(&ItemArgs::new("buy milk").with_priority(4))
            .with_uuid("u1")
            .with_temp_id("tmp");
        let body = execute(&handler, "*", vec![command]);

        assert_eq!(body["sync_status"]["u1"], "ok");
        let real = body["temp_id_mapping"]["tmp"].as_str().unwrap();
        let record = store(&handler).get(ResourceKind::Items, real).unwrap();
        assert_eq!(record["content"], "buy milk");
        assert_eq!(record["priority"], 4);
    }

    #[test]
    fn temp_ids_resolve_within_batch() {
        let handler = create_handler();
        let parent = Command::item_add(&ItemArgs::new("parent"))
            .with_uuid("u1")
            .with_temp_id("tmp-parent");
        let child = Command::item_add(&ItemArgs::new("child").with_parent("tmp-parent"))
            .with_uuid("u2")
            .with_temp_id("tmp-child");
        let close = Command::item_complete("tmp-child").with_uuid("u3");

        let body = execute(&handler, "*", vec![parent, child, close]);
        let parent_id = body["temp_id_mapping"]["tmp-parent"].as_str().unwrap();
        let child_id = body["temp_id_mapping"]["tmp-child"].as_str().unwrap();

        let record = store(&handler).get(ResourceKind::Items, child_id).unwrap();
        assert_eq!(record["parent_id"], parent_id);
        assert_eq!(record["checked"], true);
        assert_eq!(body["sync_status"]["u3"], "ok");
    }

    #[test]
    fn failing_command_reports_error() {
        let handler = create_handler();
        store(&handler).upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));

        let body = execute(
            &handler,
            "*",
            vec![
                Command::item_update("1", &ItemArgs::new("b")).with_uuid("ok"),
                Command::item_update("404", &ItemArgs::new("c")).with_uuid("bad"),
                Command::item_add(&ItemArgs::default()).with_uuid("empty"),
            ],
        );

        assert_eq!(body["sync_status"]["ok"], "ok");
        assert_eq!(body["sync_status"]["bad"]["error_code"], 22);
        assert_eq!(body["sync_status"]["empty"]["error_code"], 19);
        assert_eq!(
            store(&handler).get(ResourceKind::Items, "1").unwrap()["content"],
            "b"
        );
    }

    #[test]
    fn replayed_uuid_is_not_applied_twice() {
        let handler = create_handler();
        let command = Command::item_add(&ItemArgs::new("once")).with_uuid("u1");
        execute(&handler, "*", vec![command.clone()]);
        let body = execute(&handler, "*", vec![command]);

        assert_eq!(body["sync_status"]["u1"], "ok");
        assert_eq!(store(&handler).count(ResourceKind::Items), 1);
    }

    #[test]
    fn delete_is_visible_in_delta() {
        let handler = create_handler();
        store(&handler).upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));
        let cursor = fetch(&handler, "*")["sync_token"].as_str().unwrap().to_string();

        let body = execute(
            &handler,
            &cursor,
            vec![Command::item_delete("1").with_uuid("u1")],
        );
        assert_eq!(body["items"][0]["is_deleted"], true);
        assert!(!store(&handler).is_live(ResourceKind::Items, "1"));
    }

    #[test]
    fn commands_need_uuids() {
        let handler = create_handler();
        let result = handler.handle_request(SyncRequest::execute(
            SyncCursor::wildcard(),
            vec![Command::item_delete("1")],
            &[ResourceKind::Items],
        ));
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
    }

    #[test]
    fn batch_limit_enforced() {
        let config = ServerConfig::default().with_max_commands(1);
        let context = Arc::new(HandlerContext::new(config, Arc::new(ServerStore::new())));
        let handler = RequestHandler::new(context);

        let result = handler.handle_request(SyncRequest::execute(
            SyncCursor::wildcard(),
            vec![
                Command::item_delete("1").with_uuid("a"),
                Command::item_delete("2").with_uuid("b"),
            ],
            &[ResourceKind::Items],
        ));
        assert!(matches!(result, Err(ServerError::TooManyCommands { .. })));
    }

    #[test]
    fn due_arguments_become_due_records() {
        let fields = item_fields(
            json!({"due_datetime": "2024-03-05T10:00:00Z"})
                .as_object()
                .unwrap(),
        );
        assert_eq!(fields["due"]["date"], "2024-03-05");

        let fields = item_fields(json!({"due_string": "every day"}).as_object().unwrap());
        assert_eq!(fields["due"]["is_recurring"], true);
    }

    #[test]
    fn auth_is_checked_before_parsing() {
        let config = ServerConfig::default().with_static_token("secret");
        let context = Arc::new(HandlerContext::new(config, Arc::new(ServerStore::new())));
        let handler = RequestHandler::new(context);

        assert!(matches!(
            handler.handle("wrong", "not json"),
            Err(ServerError::NotAuthorized(_))
        ));
        assert!(matches!(
            handler.handle("secret", "not json"),
            Err(ServerError::InvalidRequest(_))
        ));
        assert!(handler
            .handle("secret", r#"{"sync_token": "*", "resource_types": ["items"]}"#)
            .is_ok());
    }
}
