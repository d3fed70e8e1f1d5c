use media_sync_models::{HistoryAction, HistoryEvent};
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};

use super::{decode_time, encode_time, LocalStore};
use crate::error::{StoreError, StoreResult};

const SELECT_EVENT: &str = "SELECT id, media_id, action_type, value, previous_value, created_at FROM history";

struct RawEvent {
    id: String,
    media_id: String,
    action_type: String,
    value: Option<String>,
    previous_value: Option<String>,
    created_at: String,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            media_id: row.get(1)?,
            action_type: row.get(2)?,
            value: row.get(3)?,
            previous_value: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn decode(self) -> StoreResult<HistoryEvent> {
        let action_type = self.action_type.parse::<HistoryAction>().map_err(|_| StoreError::Corrupt {
            column: "history.action_type",
            value: self.action_type.clone(),
        })?;
        Ok(HistoryEvent {
            id: self.id,
            media_id: self.media_id,
            action_type,
            value: decode_payload(self.value)?,
            previous_value: decode_payload(self.previous_value)?,
            created_at: decode_time("history.created_at", &self.created_at)?,
        })
    }
}

fn decode_payload(raw: Option<String>) -> StoreResult<Option<Map<String, Value>>> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(None),
    }
}

fn encode_payload(payload: &Option<Map<String, Value>>) -> StoreResult<Option<String>> {
    match payload {
        Some(map) => Ok(Some(serde_json::to_string(map)?)),
        None => Ok(None),
    }
}

/// Insert-only write; `or_ignore` skips events whose id is already stored
fn insert(conn: &Connection, event: &HistoryEvent, or_ignore: bool) -> StoreResult<usize> {
    let verb = if or_ignore { "INSERT OR IGNORE" } else { "INSERT" };
    let changed = conn.execute(
        &format!(
            "{} INTO history (id, media_id, action_type, value, previous_value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            verb
        ),
        params![
            event.id,
            event.media_id,
            event.action_type.as_str(),
            encode_payload(&event.value)?,
            encode_payload(&event.previous_value)?,
            encode_time(&event.created_at),
        ],
    )?;
    Ok(changed)
}

fn collect_events(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<HistoryEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, RawEvent::from_row)?;
    let mut events = Vec::new();
    for raw in rows {
        events.push(raw?.decode()?);
    }
    Ok(events)
}

impl LocalStore {
    /// Append an event. The log is append-only: existing events are never
    /// rewritten, and re-appending an id is an error.
    pub fn append_history(&self, event: &HistoryEvent) -> StoreResult<()> {
        self.with_conn(|conn| {
            insert(conn, event, false)?;
            Ok(())
        })
    }

    /// Add events pulled from elsewhere, skipping ones already present.
    /// Returns how many were new.
    pub fn merge_history(&self, events: &[HistoryEvent]) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            for event in events {
                added += insert(&tx, event, true)?;
            }
            tx.commit()?;
            Ok(added)
        })
    }

    /// Events for one media id, newest first. Outlives the item itself.
    pub fn history_for(&self, media_id: &str) -> StoreResult<Vec<HistoryEvent>> {
        self.with_conn(|conn| {
            collect_events(
                conn,
                &format!("{} WHERE media_id = ?1 ORDER BY created_at DESC, rowid DESC", SELECT_EVENT),
                params![media_id],
            )
        })
    }

    pub fn recent_history(&self, limit: usize) -> StoreResult<Vec<HistoryEvent>> {
        self.with_conn(|conn| {
            collect_events(
                conn,
                &format!("{} ORDER BY created_at DESC, rowid DESC LIMIT ?1", SELECT_EVENT),
                params![limit as i64],
            )
        })
    }

    pub fn history_count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn test_append_and_read_back() {
        let store = LocalStore::in_memory().unwrap();
        let event = HistoryEvent::new(
            "m1",
            HistoryAction::StatusChange,
            payload(json!({"status": "completed"})),
            payload(json!({"status": "watching"})),
        );
        store.append_history(&event).unwrap();

        let events = store.history_for("m1").unwrap();
        assert_eq!(events, vec![event]);
    }

    #[test]
    fn test_append_is_insert_only() {
        let store = LocalStore::in_memory().unwrap();
        let event = HistoryEvent::new("m1", HistoryAction::Added, None, None);
        store.append_history(&event).unwrap();

        let mut rewritten = event.clone();
        rewritten.action_type = HistoryAction::Deleted;
        assert!(store.append_history(&rewritten).is_err());
        assert_eq!(store.history_for("m1").unwrap()[0].action_type, HistoryAction::Added);
    }

    #[test]
    fn test_merge_history_skips_known_events() {
        let store = LocalStore::in_memory().unwrap();
        let known = HistoryEvent::new("m1", HistoryAction::Added, None, None);
        store.append_history(&known).unwrap();

        let mut tampered = known.clone();
        tampered.action_type = HistoryAction::Deleted;
        let fresh = HistoryEvent::new("m2", HistoryAction::Added, None, None);

        assert_eq!(store.merge_history(&[tampered, fresh]).unwrap(), 1);
        assert_eq!(store.history_count().unwrap(), 2);
        assert_eq!(store.history_for("m1").unwrap()[0].action_type, HistoryAction::Added);
    }

    #[test]
    fn test_recent_history_limit() {
        let store = LocalStore::in_memory().unwrap();
        for media_id in ["a", "b", "c"] {
            store
                .append_history(&HistoryEvent::new(media_id, HistoryAction::Added, None, None))
                .unwrap();
        }
        assert_eq!(store.recent_history(2).unwrap().len(), 2);
    }
}
