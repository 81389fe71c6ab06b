//! Server-side entity store with a change log.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use taskmirror_protocol::ResourceKind;

/// A recorded entity change.
#[derive(Debug, Clone)]
struct Change {
    seq: u64,
    kind: ResourceKind,
    id: String,
}

struct Inner {
    /// Bumped on reset; cursors from older epochs are unknown.
    epoch: u64,
    next_seq: u64,
    next_id: u64,
    changes: Vec<Change>,
    records: BTreeMap<(ResourceKind, String), Value>,
}

/// Server-side entity store.
///
/// The store maintains:
/// - Current records of every entity, including deleted ones
/// - A change log in commit order, used to answer delta requests
/// - The cursor epoch, which invalidates all issued cursors when bumped
pub struct ServerStore {
    inner: RwLock<Inner>,
}

impl ServerStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                epoch: 1,
                next_seq: 1,
                next_id: 1000,
                changes: Vec::new(),
                records: BTreeMap::new(),
            }),
        }
    }

    /// Returns the cursor for the latest change.
    pub fn cursor(&self) -> String {
        let inner = self.inner.read();
        encode_cursor(inner.epoch, inner.next_seq - 1)
    }

    /// Parses a cursor issued by this store.
    ///
    /// Returns `None` for foreign, malformed or stale-epoch cursors.
    pub fn parse_cursor(&self, cursor: &str) -> Option<u64> {
        let (epoch, seq) = cursor.strip_prefix('e')?.split_once(".s")?;
        let epoch: u64 = epoch.parse().ok()?;
        let seq: u64 = seq.parse().ok()?;

        let inner = self.inner.read();
        (epoch == inner.epoch && seq < inner.next_seq).then_some(seq)
    }

    /// Invalidates every cursor issued so far.
    pub fn reset_cursors(&self) {
        self.inner.write().epoch += 1;
    }

    /// Allocates a fresh entity id.
    pub fn allocate_id(&self) -> String {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        id.to_string()
    }

    /// Inserts or replaces a record and logs the change.
    ///
    /// The record must carry a string or numeric `id`.
    pub fn upsert(&self, kind: ResourceKind, record: Value) -> Option<u64> {
        let id = record.get("id").and_then(taskmirror_protocol::coerce_id)?;
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.changes.push(Change {
            seq,
            kind,
            id: id.clone(),
        });
        inner.records.insert((kind, id), record);
        Some(seq)
    }

    /// Returns the current record of an entity.
    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.inner.read().records.get(&(kind, id.to_string())).cloned()
    }

    /// Returns true if the entity exists and is not deleted.
    pub fn is_live(&self, kind: ResourceKind, id: &str) -> bool {
        self.get(kind, id).is_some_and(|record| !is_removed(&record))
    }

    /// Returns the latest record of every entity changed after `seq`.
    pub fn changes_since(&self, seq: u64, kind: ResourceKind) -> Vec<Value> {
        let inner = self.inner.read();
        let mut ids: Vec<&str> = Vec::new();
        for change in inner.changes.iter().filter(|c| c.seq > seq && c.kind == kind) {
            if !ids.contains(&change.id.as_str()) {
                ids.push(&change.id);
            }
        }
        ids.into_iter()
            .filter_map(|id| inner.records.get(&(kind, id.to_string())).cloned())
            .collect()
    }

    /// Returns every live record of a kind.
    pub fn live(&self, kind: ResourceKind) -> Vec<Value> {
        self.inner
            .read()
            .records
            .iter()
            .filter(|((k, _), record)| *k == kind && !is_removed(record))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Returns the number of live records of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.live(kind).len()
    }

    /// Returns the number of logged changes.
    pub fn change_count(&self) -> usize {
        self.inner.read().changes.len()
    }
}

impl Default for ServerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_cursor(epoch: u64, seq: u64) -> String {
    format!("e{epoch}.s{seq}")
}

fn is_removed(record: &Value) -> bool {
    let flag = |name: &str| record.get(name).and_then(Value::as_bool).unwrap_or(false);
    flag("is_deleted") || flag("is_archived")
}

/// Merges `patch` into the object `record`, overwriting existing keys.
pub(crate) fn merge_fields(record: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(map) = record {
        for (key, value) in patch {
            map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_store_cursor() {
        let store = ServerStore::new();
        assert_eq!(store.cursor(), "e1.s0");
        assert_eq!(store.parse_cursor("e1.s0"), Some(0));
        assert_eq!(store.change_count(), 0);
    }

    #[test]
    fn upsert_advances_cursor() {
        let store = ServerStore::new();
        store.upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));
        store.upsert(ResourceKind::Items, json!({"id": 2, "content": "b"}));
        assert_eq!(store.cursor(), "e1.s2");
        assert_eq!(store.count(ResourceKind::Items), 2);
        assert!(store.is_live(ResourceKind::Items, "2"));
    }

    #[test]
    fn upsert_requires_id() {
        let store = ServerStore::new();
        assert!(store.upsert(ResourceKind::Items, json!({"content": "a"})).is_none());
    }

    #[test]
    fn changes_since_returns_latest_record_once() {
        let store = ServerStore::new();
        store.upsert(ResourceKind::Items, json!({"id": "1", "content": "a"}));
        let mark = store.parse_cursor(&store.cursor()).unwrap();
        store.upsert(ResourceKind::Items, json!({"id": "2", "content": "b"}));
        store.upsert(ResourceKind::Items, json!({"id": "2", "content": "b2"}));
        store.upsert(ResourceKind::Projects, json!({"id": "p", "name": "Inbox"}));

        let items = store.changes_since(mark, ResourceKind::Items);
        assert_eq!(items, vec![json!({"id": "2", "content": "b2"})]);
        assert_eq!(store.changes_since(mark, ResourceKind::Projects).len(), 1);
        assert!(store.changes_since(mark, ResourceKind::Labels).is_empty());
    }

    #[test]
    fn deleted_records_stay_in_deltas_but_not_live() {
        let store = ServerStore::new();
        store.upsert(ResourceKind::Items, json!({"id": "1", "is_deleted": true}));
        assert!(store.live(ResourceKind::Items).is_empty());
        assert_eq!(store.changes_since(0, ResourceKind::Items).len(), 1);
        assert!(!store.is_live(ResourceKind::Items, "1"));
    }

    #[test]
    fn unknown_cursors() {
        let store = ServerStore::new();
        assert_eq!(store.parse_cursor("*"), None);
        assert_eq!(store.parse_cursor("garbage"), None);
        assert_eq!(store.parse_cursor("e1.s99"), None);

        store.reset_cursors();
        assert_eq!(store.parse_cursor("e1.s0"), None);
        assert_eq!(store.parse_cursor("e2.s0"), Some(0));
    }

    #[test]
    fn allocated_ids_are_unique() {
        let store = ServerStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn merge_overwrites_fields() {
        let mut record = json!({"id": "1", "content": "a", "priority": 1});
        let patch = json!({"content": "b"});
        merge_fields(&mut record, patch.as_object().unwrap());
        assert_eq!(record, json!({"id": "1", "content": "b", "priority": 1}));
    }
}
