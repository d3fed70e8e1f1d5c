//! On-device durable store (SQLite).
//!
//! Every call is synchronous and never touches the network. Writes recompute
//! derived fields and keep `updated_at` from moving backwards for an id.

mod collections;
mod history;
mod media;
mod schema;

pub use media::MediaQuery;
pub use schema::SCHEMA_VERSION;

use chrono::{DateTime, SecondsFormat, Utc};
use media_sync_models::{MediaItem, SmartCollection};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

const LAST_SYNC_KEY: &str = "last_sync";

/// Handle to the local database. Clones share one connection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.display(), "Opened local store");
        Self::init(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }

    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT value FROM sync_meta WHERE key = ?1", params![key], |row| row.get(0))
                .optional()?)
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Time of the last reconcile that reached the remote store
    pub fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        match self.get_meta(LAST_SYNC_KEY)? {
            Some(value) => Ok(Some(decode_time("sync_meta.last_sync", &value)?)),
            None => Ok(None),
        }
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.set_meta(LAST_SYNC_KEY, &encode_time(&at))
    }

    /// Replace all media and collections in one transaction (import).
    /// History and the mutation queue are left alone.
    pub fn replace_all(&self, items: &[MediaItem], saved: &[SmartCollection]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM media", [])?;
            tx.execute("DELETE FROM smart_collections", [])?;
            for item in items {
                media::upsert(&tx, item)?;
            }
            for collection in saved {
                collections::upsert(&tx, collection)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Full data wipe (logout/reset). The only operation that removes history.
    pub fn wipe(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for table in ["media", "history", "smart_collections", "sync_queue", "dead_letters", "sync_meta"] {
                tx.execute(&format!("DELETE FROM {}", table), [])?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

/// Fixed-width RFC 3339 so text comparison in SQL matches time order
pub(crate) fn encode_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(column: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_models::{CollectionDraft, HistoryAction, HistoryEvent, MediaDraft, MediaType};

    #[test]
    fn test_open_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("library.db");

        let item = MediaDraft::new("Dune", MediaType::Book).into_item(Utc::now());
        {
            let store = LocalStore::open(&path).unwrap();
            store.put_media(&item).unwrap();
            store.set_last_sync(item.updated_at).unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get_media(&item.id).unwrap().unwrap().title, "Dune");
        assert_eq!(reopened.last_sync().unwrap(), Some(item.updated_at));
    }

    #[test]
    fn test_time_encoding_sorts_as_text() {
        let earlier = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let later = "2024-05-01T10:00:00.5Z".parse::<DateTime<Utc>>().unwrap();
        assert!(encode_time(&earlier) < encode_time(&later));
        assert_eq!(decode_time("t", &encode_time(&later)).unwrap(), later);
        assert!(matches!(decode_time("t", "yesterday"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_replace_all_keeps_history() {
        let store = LocalStore::in_memory().unwrap();
        let old = MediaDraft::new("Old", MediaType::Movie).into_item(Utc::now());
        store.put_media(&old).unwrap();
        store
            .append_history(&HistoryEvent::new(&old.id, HistoryAction::Added, None, None))
            .unwrap();

        let new = MediaDraft::new("New", MediaType::Game).into_item(Utc::now());
        let collection = CollectionDraft::new("Backlog").into_collection(Utc::now());
        store.replace_all(&[new.clone()], &[collection]).unwrap();

        let all = store.all_media().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, new.id);
        assert_eq!(store.all_collections().unwrap().len(), 1);
        assert_eq!(store.history_for(&old.id).unwrap().len(), 1);
    }

    #[test]
    fn test_wipe_clears_everything() {
        let store = LocalStore::in_memory().unwrap();
        let item = MediaDraft::new("Dune", MediaType::Book).into_item(Utc::now());
        store.put_media(&item).unwrap();
        store
            .append_history(&HistoryEvent::new(&item.id, HistoryAction::Added, None, None))
            .unwrap();
        store.set_last_sync(Utc::now()).unwrap();

        store.wipe().unwrap();
        assert!(store.all_media().unwrap().is_empty());
        assert!(store.recent_history(10).unwrap().is_empty());
        assert_eq!(store.last_sync().unwrap(), None);
    }
}
