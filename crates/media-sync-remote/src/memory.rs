use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_sync_models::RemoteTable;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::RemoteError;
use crate::traits::{Order, RemoteStore};

#[derive(Default)]
struct MemoryState {
    tables: HashMap<RemoteTable, BTreeMap<String, Value>>,
    unreachable: bool,
    rejections: HashMap<String, u16>,
    latency: Option<Duration>,
    writes: usize,
}

/// In-process remote store.
///
/// Behaves like the PostgREST backend (upsert inserts, field-level updates,
/// idempotent deletes) and can be switched offline, slowed down or told to
/// reject writes for a given record id. Clones share the same tables, which
/// lets two coordinators act as two devices against one backend.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    pub fn is_reachable(&self) -> bool {
        !self.lock().unreachable
    }

    /// Delay every call, e.g. to exercise per-call timeouts
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Answer writes touching `record_id` with a permanent rejection
    pub fn reject_record(&self, record_id: impl Into<String>, status: u16) {
        self.lock().rejections.insert(record_id.into(), status);
    }

    pub fn clear_rejections(&self) {
        self.lock().rejections.clear();
    }

    /// Write straight into a table, bypassing reachability (another device's write)
    pub fn seed(&self, table: RemoteTable, row: Value) {
        if let Some(id) = row_id(&row) {
            self.lock().tables.entry(table).or_default().insert(id, row);
        }
    }

    pub fn remove(&self, table: RemoteTable, id: &str) -> Option<Value> {
        self.lock().tables.get_mut(&table).and_then(|rows| rows.remove(id))
    }

    pub fn get(&self, table: RemoteTable, id: &str) -> Option<Value> {
        self.lock().tables.get(&table).and_then(|rows| rows.get(id).cloned())
    }

    pub fn rows(&self, table: RemoteTable) -> Vec<Value> {
        self.lock()
            .tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, table: RemoteTable) -> usize {
        self.lock().tables.get(&table).map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, table: RemoteTable) -> bool {
        self.len(table) == 0
    }

    /// Number of accepted insert/update/delete calls
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    async fn enter(&self, record_id: Option<&str>) -> Result<(), RemoteError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let state = self.lock();
        if state.unreachable {
            return Err(RemoteError::Unavailable("memory remote is offline".to_string()));
        }
        if let Some(status) = record_id.and_then(|id| state.rejections.get(id)) {
            return Err(RemoteError::rejected(*status, "rejected by memory remote"));
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> Option<String> {
    row.get("id").and_then(Value::as_str).map(str::to_string)
}

fn overlay(target: &mut Value, fields: &Value) {
    if let (Value::Object(target), Value::Object(fields)) = (target, fields) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn compare_column(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (a.parse::<DateTime<Utc>>(), b.parse::<DateTime<Utc>>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, table: RemoteTable, row: Value) -> Result<Value, RemoteError> {
        let id = row_id(&row).ok_or_else(|| RemoteError::rejected(400, "row has no string id"))?;
        self.enter(Some(&id)).await?;

        let mut state = self.lock();
        state.writes += 1;
        let rows = state.tables.entry(table).or_default();
        let stored = rows.entry(id).or_insert_with(|| Value::Object(Map::new()));
        overlay(stored, &row);
        Ok(stored.clone())
    }

    async fn update(&self, table: RemoteTable, id: &str, fields: Value) -> Result<(), RemoteError> {
        self.enter(Some(id)).await?;

        let mut state = self.lock();
        state.writes += 1;
        if let Some(stored) = state.tables.get_mut(&table).and_then(|rows| rows.get_mut(id)) {
            overlay(stored, &fields);
        }
        Ok(())
    }

    async fn delete(&self, table: RemoteTable, id: &str) -> Result<(), RemoteError> {
        self.enter(Some(id)).await?;

        let mut state = self.lock();
        state.writes += 1;
        if let Some(rows) = state.tables.get_mut(&table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError> {
        self.enter(None).await?;

        let mut rows = self.rows(table);
        rows.sort_by(|a, b| {
            let ordering = compare_column(a.get(&order.column), b.get(&order.column));
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        if let Some(limit) = order.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.enter(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_is_upsert() {
        let remote = MemoryRemote::new();
        let row = json!({"id": "m1", "title": "Dune", "progress": 0});
        remote.insert(RemoteTable::Media, row.clone()).await.unwrap();
        remote.insert(RemoteTable::Media, row).await.unwrap();

        assert_eq!(remote.len(RemoteTable::Media), 1);
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn test_update_sets_fields_and_ignores_missing_rows() {
        let remote = MemoryRemote::new();
        remote.seed(RemoteTable::Media, json!({"id": "m1", "title": "Dune", "progress": 0}));

        remote.update(RemoteTable::Media, "m1", json!({"progress": 3})).await.unwrap();
        remote.update(RemoteTable::Media, "ghost", json!({"progress": 3})).await.unwrap();

        assert_eq!(remote.get(RemoteTable::Media, "m1").unwrap()["progress"], json!(3));
        assert_eq!(remote.get(RemoteTable::Media, "m1").unwrap()["title"], json!("Dune"));
        assert!(remote.get(RemoteTable::Media, "ghost").is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let remote = MemoryRemote::new();
        remote.seed(RemoteTable::Media, json!({"id": "m1"}));
        remote.delete(RemoteTable::Media, "m1").await.unwrap();
        remote.delete(RemoteTable::Media, "m1").await.unwrap();
        assert!(remote.is_empty(RemoteTable::Media));
    }

    #[tokio::test]
    async fn test_select_orders_by_timestamp() {
        let remote = MemoryRemote::new();
        remote.seed(RemoteTable::Media, json!({"id": "a", "updated_at": "2024-05-01T10:00:00Z"}));
        remote.seed(RemoteTable::Media, json!({"id": "b", "updated_at": "2024-05-01T10:00:00.500Z"}));
        remote.seed(RemoteTable::Media, json!({"id": "c", "updated_at": "2023-01-01T00:00:00Z"}));

        let rows = remote.select(RemoteTable::Media, Order::desc("updated_at")).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let rows = remote.select(RemoteTable::Media, Order::asc("updated_at").limit(1)).await.unwrap();
        assert_eq!(rows[0]["id"], json!("c"));
    }

    #[tokio::test]
    async fn test_offline_and_rejection_switches() {
        let remote = MemoryRemote::new();
        remote.set_reachable(false);
        assert!(matches!(remote.ping().await, Err(RemoteError::Unavailable(_))));
        assert!(remote.insert(RemoteTable::Media, json!({"id": "m1"})).await.is_err());
        assert_eq!(remote.write_count(), 0);

        remote.set_reachable(true);
        remote.reject_record("m2", 422);
        let err = remote.insert(RemoteTable::Media, json!({"id": "m2"})).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(remote.insert(RemoteTable::Media, json!({"id": "m1"})).await.is_ok());
    }
}
