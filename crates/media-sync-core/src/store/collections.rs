use media_sync_models::SmartCollection;
use rusqlite::{params, Connection, OptionalExtension};

use super::{decode_time, encode_time, LocalStore};
use crate::error::StoreResult;

pub(super) fn upsert(conn: &Connection, collection: &SmartCollection) -> StoreResult<SmartCollection> {
    let mut collection = collection.clone();

    let stored: Option<String> = conn
        .query_row(
            "SELECT updated_at FROM smart_collections WHERE id = ?1",
            params![collection.id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(stored) = stored {
        let stored = decode_time("smart_collections.updated_at", &stored)?;
        if collection.updated_at < stored {
            collection.updated_at = stored;
        }
    }

    conn.execute(
        "INSERT INTO smart_collections (id, title, updated_at, data) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            updated_at = excluded.updated_at,
            data = excluded.data",
        params![
            collection.id,
            collection.title,
            encode_time(&collection.updated_at),
            serde_json::to_string(&collection)?,
        ],
    )?;
    Ok(collection)
}

impl LocalStore {
    pub fn all_collections(&self) -> StoreResult<Vec<SmartCollection>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT data FROM smart_collections ORDER BY updated_at DESC, id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut collections = Vec::new();
            for data in rows {
                collections.push(serde_json::from_str(&data?)?);
            }
            Ok(collections)
        })
    }

    pub fn get_collection(&self, id: &str) -> StoreResult<Option<SmartCollection>> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM smart_collections WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            match data {
                Some(data) => Ok(Some(serde_json::from_str(&data)?)),
                None => Ok(None),
            }
        })
    }

    pub fn put_collection(&self, collection: &SmartCollection) -> StoreResult<SmartCollection> {
        self.with_conn(|conn| upsert(conn, collection))
    }

    pub fn reconcile_collections(&self, collections: &[SmartCollection], removed: &[String]) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for collection in collections {
                upsert(&tx, collection)?;
            }
            for id in removed {
                tx.execute("DELETE FROM smart_collections WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn delete_collection(&self, id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM smart_collections WHERE id = ?1", params![id])? > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use media_sync_models::CollectionDraft;

    #[test]
    fn test_collection_crud() {
        let store = LocalStore::in_memory().unwrap();
        let mut draft = CollectionDraft::new("Comfort rewatches");
        draft.media_ids = vec!["m1".to_string(), "m2".to_string()];
        let collection = draft.into_collection(Utc::now());

        store.put_collection(&collection).unwrap();
        assert_eq!(store.get_collection(&collection.id).unwrap(), Some(collection.clone()));

        let mut stale = collection.clone();
        stale.title = "Renamed".to_string();
        stale.updated_at = collection.updated_at - Duration::minutes(1);
        let stored = store.put_collection(&stale).unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.updated_at, collection.updated_at);

        assert!(store.delete_collection(&collection.id).unwrap());
        assert!(store.all_collections().unwrap().is_empty());
    }
}
