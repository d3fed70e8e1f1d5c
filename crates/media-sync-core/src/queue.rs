//! Durable FIFO of writes the remote store has not confirmed yet.

use chrono::Utc;
use media_sync_models::{MutationMessage, MutationOp, RemoteTable};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{decode_time, encode_time, LocalStore};

const COLUMNS: &str = "id, table_name, operation, record_id, payload, enqueued_at, attempts, last_error";

/// Queue over the `sync_queue` table, with permanently rejected entries
/// parked in `dead_letters`.
///
/// Delivery is at-least-once: an entry is removed only after the remote store
/// confirmed it, so every replayed operation must be idempotent.
#[derive(Clone)]
pub struct MutationQueue {
    store: LocalStore,
}

struct RawMessage {
    id: String,
    table: String,
    operation: String,
    record_id: String,
    payload: String,
    enqueued_at: String,
    attempts: i64,
    last_error: Option<String>,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            table: row.get(1)?,
            operation: row.get(2)?,
            record_id: row.get(3)?,
            payload: row.get(4)?,
            enqueued_at: row.get(5)?,
            attempts: row.get(6)?,
            last_error: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<MutationMessage> {
        let table = self.table.parse::<RemoteTable>().map_err(|_| StoreError::Corrupt {
            column: "sync_queue.table_name",
            value: self.table.clone(),
        })?;
        let operation = self.operation.parse::<MutationOp>().map_err(|_| StoreError::Corrupt {
            column: "sync_queue.operation",
            value: self.operation.clone(),
        })?;
        Ok(MutationMessage {
            id: self.id,
            table,
            operation,
            record_id: self.record_id,
            payload: serde_json::from_str(&self.payload)?,
            enqueued_at: decode_time("sync_queue.enqueued_at", &self.enqueued_at)?,
            attempts: self.attempts.max(0) as u32,
            last_error: self.last_error,
        })
    }
}

fn insert(conn: &Connection, message: &MutationMessage) -> StoreResult<()> {
    conn.execute(
        &format!("INSERT INTO sync_queue ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
        params![
            message.id,
            message.table.as_str(),
            message.operation.as_str(),
            message.record_id,
            serde_json::to_string(&message.payload)?,
            encode_time(&message.enqueued_at),
            message.attempts,
            message.last_error,
        ],
    )?;
    Ok(())
}

fn select(conn: &Connection, sql: &str) -> StoreResult<Vec<MutationMessage>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], RawMessage::from_row)?;
    let mut messages = Vec::new();
    for raw in rows {
        messages.push(raw?.decode()?);
    }
    Ok(messages)
}

impl MutationQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Durably append `message`; returns its id
    pub fn append(&self, message: &MutationMessage) -> StoreResult<String> {
        self.store.with_conn(|conn| insert(conn, message))?;
        debug!(
            id = %message.id,
            table = %message.table,
            operation = %message.operation,
            record_id = %message.record_id,
            "Queued mutation"
        );
        Ok(message.id.clone())
    }

    /// Snapshot of every pending entry in FIFO order. Nothing is removed.
    pub fn drain(&self) -> StoreResult<Vec<MutationMessage>> {
        self.store.with_conn(|conn| {
            select(
                conn,
                &format!("SELECT {} FROM sync_queue ORDER BY enqueued_at ASC, seq ASC", COLUMNS),
            )
        })
    }

    /// Remove after confirmed delivery. `false` means another drain already
    /// removed it, which is not an error.
    pub fn remove(&self, id: &str) -> StoreResult<bool> {
        self.store
            .with_conn(|conn| Ok(conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])? > 0))
    }

    pub fn contains(&self, id: &str) -> StoreResult<bool> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM sync_queue WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.store.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Ids with a queued delete against `table`
    pub fn pending_delete_ids(&self, table: RemoteTable) -> StoreResult<HashSet<String>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT record_id FROM sync_queue WHERE table_name = ?1 AND operation = ?2",
            )?;
            let rows = stmt.query_map(params![table.as_str(), MutationOp::Delete.as_str()], |row| {
                row.get::<_, String>(0)
            })?;
            let mut ids = HashSet::new();
            for id in rows {
                ids.insert(id?);
            }
            Ok(ids)
        })
    }

    /// True when any entry for `record_id` is still queued
    pub fn has_pending(&self, table: RemoteTable, record_id: &str) -> StoreResult<bool> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM sync_queue WHERE table_name = ?1 AND record_id = ?2 LIMIT 1",
                    params![table.as_str(), record_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    /// True when a write for `record_id` was given up on
    pub fn has_dead_letter(&self, table: RemoteTable, record_id: &str) -> StoreResult<bool> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM dead_letters WHERE table_name = ?1 AND record_id = ?2 LIMIT 1",
                    params![table.as_str(), record_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    /// True when `record_id` has writes the remote has not accepted yet,
    /// either queued or parked as dead letters. New writes for such a record
    /// must queue behind them.
    pub fn has_unconfirmed(&self, table: RemoteTable, record_id: &str) -> StoreResult<bool> {
        Ok(self.has_pending(table, record_id)? || self.has_dead_letter(table, record_id)?)
    }

    /// Count a permanent rejection; returns the new attempt count
    pub fn record_failure(&self, id: &str, error: &str) -> StoreResult<u32> {
        self.store.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
                params![id, error],
            )?;
            let attempts: Option<i64> = tx
                .query_row("SELECT attempts FROM sync_queue WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            tx.commit()?;
            Ok(attempts.unwrap_or(0).max(0) as u32)
        })
    }

    /// Remember the last transient error without counting it
    pub fn note_error(&self, id: &str, error: &str) -> StoreResult<()> {
        self.store.with_conn(|conn| {
            conn.execute("UPDATE sync_queue SET last_error = ?2 WHERE id = ?1", params![id, error])?;
            Ok(())
        })
    }

    /// Move an entry out of the queue into `dead_letters`, together with every
    /// other queued entry for the same record so none of them replays against
    /// a row the remote never accepted. Returns how many entries moved; 0 when
    /// `id` was no longer queued.
    pub fn dead_letter(&self, id: &str, error: &str) -> StoreResult<usize> {
        let dead_at = encode_time(&Utc::now());
        let moved = self.store.with_conn(|conn| {
            let tx = conn.transaction()?;
            let key: Option<(String, String)> = tx
                .query_row(
                    "SELECT table_name, record_id FROM sync_queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((table, record_id)) = key else {
                return Ok(0);
            };
            let moved = tx.execute(
                &format!(
                    "INSERT INTO dead_letters ({cols}, dead_at)
                     SELECT {cols}, ?3 FROM sync_queue WHERE table_name = ?1 AND record_id = ?2",
                    cols = COLUMNS
                ),
                params![table, record_id, dead_at],
            )?;
            tx.execute(
                "UPDATE dead_letters SET last_error = ?3
                 WHERE table_name = ?1 AND record_id = ?2 AND dead_at = ?4 AND id != ?5",
                params![table, record_id, format!("held behind rejected write {}", id), dead_at, id],
            )?;
            tx.execute("UPDATE dead_letters SET last_error = ?2 WHERE id = ?1", params![id, error])?;
            tx.execute(
                "DELETE FROM sync_queue WHERE table_name = ?1 AND record_id = ?2",
                params![table, record_id],
            )?;
            tx.commit()?;
            Ok(moved)
        })?;
        if moved > 0 {
            warn!(id = %id, moved, error = %error, "Mutation moved to dead letters");
        }
        Ok(moved)
    }

    pub fn dead_letters(&self) -> StoreResult<Vec<MutationMessage>> {
        self.store.with_conn(|conn| {
            select(
                conn,
                &format!("SELECT {} FROM dead_letters ORDER BY enqueued_at ASC, dead_at ASC", COLUMNS),
            )
        })
    }

    pub fn dead_letter_count(&self) -> StoreResult<usize> {
        self.store.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Put every dead letter back in the queue with a fresh attempt count.
    /// The original enqueue time is kept, so requeued writes replay ahead of
    /// anything written to the same record since. Returns how many were
    /// requeued.
    pub fn retry_dead_letters(&self) -> StoreResult<usize> {
        let letters = self.dead_letters()?;
        if letters.is_empty() {
            return Ok(0);
        }
        self.store.with_conn(|conn| {
            let tx = conn.transaction()?;
            for letter in &letters {
                let mut message = letter.clone();
                message.attempts = 0;
                insert(&tx, &message)?;
                tx.execute("DELETE FROM dead_letters WHERE id = ?1", params![letter.id])?;
            }
            tx.commit()?;
            Ok(letters.len())
        })
    }

    pub fn clear_dead_letters(&self) -> StoreResult<usize> {
        self.store
            .with_conn(|conn| Ok(conn.execute("DELETE FROM dead_letters", [])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn queue() -> MutationQueue {
        MutationQueue::new(LocalStore::in_memory().unwrap())
    }

    #[test]
    fn test_drain_is_fifo_by_enqueue_time() {
        let queue = queue();
        let now = Utc::now();
        let mut late = MutationMessage::update(RemoteTable::Media, "m1", json!({"progress": 2}));
        late.enqueued_at = now;
        let mut early = MutationMessage::insert(RemoteTable::Media, "m1", json!({"id": "m1"}));
        early.enqueued_at = now - Duration::seconds(5);
        let mut tie = MutationMessage::delete(RemoteTable::Media, "m1");
        tie.enqueued_at = now;

        queue.append(&late).unwrap();
        queue.append(&early).unwrap();
        queue.append(&tie).unwrap();

        let ids: Vec<_> = queue.drain().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![early.id, late.id, tie.id]);
        assert_eq!(queue.len().unwrap(), 3);
    }

    #[test]
    fn test_remove_twice_is_not_an_error() {
        let queue = queue();
        let message = MutationMessage::delete(RemoteTable::Media, "m1");
        let id = queue.append(&message).unwrap();

        assert!(queue.contains(&id).unwrap());
        assert!(queue.remove(&id).unwrap());
        assert!(!queue.remove(&id).unwrap());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_pending_delete_ids_per_table() {
        let queue = queue();
        queue.append(&MutationMessage::delete(RemoteTable::Media, "m1")).unwrap();
        queue.append(&MutationMessage::delete(RemoteTable::SmartCollections, "c1")).unwrap();
        queue
            .append(&MutationMessage::update(RemoteTable::Media, "m2", json!({"progress": 1})))
            .unwrap();

        let media = queue.pending_delete_ids(RemoteTable::Media).unwrap();
        assert_eq!(media, HashSet::from(["m1".to_string()]));
        assert!(queue.has_pending(RemoteTable::Media, "m2").unwrap());
        assert!(!queue.has_pending(RemoteTable::Media, "m3").unwrap());
    }

    #[test]
    fn test_dead_letter_roundtrip() {
        let queue = queue();
        let message = MutationMessage::insert(RemoteTable::Media, "m1", json!({"id": "m1"}));
        queue.append(&message).unwrap();

        assert_eq!(queue.record_failure(&message.id, "422 schema violation").unwrap(), 1);
        assert_eq!(queue.record_failure(&message.id, "422 schema violation").unwrap(), 2);
        assert_eq!(queue.dead_letter(&message.id, "422 schema violation").unwrap(), 1);
        assert_eq!(queue.dead_letter(&message.id, "again").unwrap(), 0);
        assert!(queue.has_dead_letter(RemoteTable::Media, "m1").unwrap());

        assert!(queue.is_empty().unwrap());
        let letters = queue.dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 2);
        assert_eq!(letters[0].last_error.as_deref(), Some("422 schema violation"));
        assert_eq!(letters[0].payload, message.payload);

        assert_eq!(queue.retry_dead_letters().unwrap(), 1);
        assert_eq!(queue.dead_letter_count().unwrap(), 0);
        let requeued = queue.drain().unwrap();
        assert_eq!(requeued[0].id, message.id);
        assert_eq!(requeued[0].attempts, 0);
    }

    #[test]
    fn test_dead_letter_takes_later_writes_for_the_record_along() {
        let queue = queue();
        let now = Utc::now();
        let mut insert = MutationMessage::insert(RemoteTable::Media, "m1", json!({"id": "m1"}));
        insert.enqueued_at = now - Duration::seconds(10);
        let mut update = MutationMessage::update(RemoteTable::Media, "m1", json!({"progress": 5}));
        update.enqueued_at = now - Duration::seconds(5);
        let other = MutationMessage::update(RemoteTable::Media, "m2", json!({"progress": 1}));
        queue.append(&insert).unwrap();
        queue.append(&update).unwrap();
        queue.append(&other).unwrap();

        assert_eq!(queue.dead_letter(&insert.id, "422").unwrap(), 2);
        assert!(!queue.has_pending(RemoteTable::Media, "m1").unwrap());
        assert!(queue.has_pending(RemoteTable::Media, "m2").unwrap());

        let letters = queue.dead_letters().unwrap();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].last_error.as_deref(), Some("422"));
        assert!(letters[1].last_error.as_deref().unwrap().starts_with("held behind"));

        // a write made after the dead-lettering still replays after the older ones
        let later = MutationMessage::update(RemoteTable::Media, "m1", json!({"progress": 7}));
        queue.append(&later).unwrap();
        assert_eq!(queue.retry_dead_letters().unwrap(), 2);
        let m1: Vec<_> = queue
            .drain()
            .unwrap()
            .into_iter()
            .filter(|m| m.record_id == "m1")
            .map(|m| m.id)
            .collect();
        assert_eq!(m1, vec![insert.id, update.id, later.id]);
    }

    #[test]
    fn test_clear_dead_letters() {
        let queue = queue();
        let message = MutationMessage::delete(RemoteTable::Media, "m1");
        queue.append(&message).unwrap();
        queue.dead_letter(&message.id, "403").unwrap();
        assert_eq!(queue.clear_dead_letters().unwrap(), 1);
        assert!(queue.dead_letters().unwrap().is_empty());
    }
}
