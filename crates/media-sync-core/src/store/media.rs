use chrono::{DateTime, Utc};
use media_sync_models::{normalize_title, MediaItem, MediaStatus, MediaType};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{decode_time, encode_time, LocalStore};
use crate::error::StoreResult;

/// Range query over the indexed media columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaQuery {
    pub status: Option<MediaStatus>,
    pub media_type: Option<MediaType>,
    pub is_favorite: Option<bool>,
    pub is_archived: Option<bool>,
    /// Matched against `normalized_title`; normalized before use
    pub title_prefix: Option<String>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MediaQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: MediaStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = Some(is_favorite);
        self
    }

    pub fn archived(mut self, is_archived: bool) -> Self {
        self.is_archived = Some(is_archived);
        self
    }

    pub fn title_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.title_prefix = Some(normalize_title(prefix.as_ref()));
        self
    }

    pub fn years(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.min_year = min;
        self.max_year = max;
        self
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(status) = self.status {
            clauses.push("status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(media_type) = self.media_type {
            clauses.push("media_type = ?");
            values.push(SqlValue::Text(media_type.as_str().to_string()));
        }
        if let Some(is_favorite) = self.is_favorite {
            clauses.push("is_favorite = ?");
            values.push(SqlValue::Integer(is_favorite as i64));
        }
        if let Some(is_archived) = self.is_archived {
            clauses.push("is_archived = ?");
            values.push(SqlValue::Integer(is_archived as i64));
        }
        if let Some(prefix) = &self.title_prefix {
            // normalized titles are [a-z0-9] only, so no LIKE escaping is needed
            clauses.push("normalized_title LIKE ?");
            values.push(SqlValue::Text(format!("{}%", normalize_title(prefix))));
        }
        if let Some(min) = self.min_year {
            clauses.push("release_year >= ?");
            values.push(SqlValue::Integer(min as i64));
        }
        if let Some(max) = self.max_year {
            clauses.push("release_year <= ?");
            values.push(SqlValue::Integer(max as i64));
        }
        if let Some(since) = &self.updated_since {
            clauses.push("updated_at >= ?");
            values.push(SqlValue::Text(encode_time(since)));
        }

        let mut sql = String::from("SELECT data FROM media");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY updated_at DESC, id");
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        (sql, values)
    }
}

/// Upsert one item: derived fields recomputed, `updated_at` never moved back
pub(super) fn upsert(conn: &Connection, item: &MediaItem) -> StoreResult<MediaItem> {
    let mut item = item.clone();
    item.refresh_derived();

    let stored: Option<String> = conn
        .query_row("SELECT updated_at FROM media WHERE id = ?1", params![item.id], |row| row.get(0))
        .optional()?;
    if let Some(stored) = stored {
        let stored = decode_time("media.updated_at", &stored)?;
        if item.updated_at < stored {
            item.updated_at = stored;
        }
    }

    let data = serde_json::to_string(&item)?;
    conn.execute(
        "INSERT INTO media (id, normalized_title, media_type, status, is_favorite, is_archived, release_year, updated_at, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            normalized_title = excluded.normalized_title,
            media_type = excluded.media_type,
            status = excluded.status,
            is_favorite = excluded.is_favorite,
            is_archived = excluded.is_archived,
            release_year = excluded.release_year,
            updated_at = excluded.updated_at,
            data = excluded.data",
        params![
            item.id,
            item.normalized_title,
            item.media_type.as_str(),
            item.status.as_str(),
            item.is_favorite,
            item.is_archived,
            item.release_year,
            encode_time(&item.updated_at),
            data,
        ],
    )?;
    Ok(item)
}

fn collect_items(conn: &Connection, sql: &str, values: Vec<SqlValue>) -> StoreResult<Vec<MediaItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
    let mut items = Vec::new();
    for data in rows {
        items.push(serde_json::from_str(&data?)?);
    }
    Ok(items)
}

impl LocalStore {
    /// Every item, most recently updated first
    pub fn all_media(&self) -> StoreResult<Vec<MediaItem>> {
        self.with_conn(|conn| collect_items(conn, "SELECT data FROM media ORDER BY updated_at DESC, id", Vec::new()))
    }

    pub fn get_media(&self, id: &str) -> StoreResult<Option<MediaItem>> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM media WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            match data {
                Some(data) => Ok(Some(serde_json::from_str(&data)?)),
                None => Ok(None),
            }
        })
    }

    /// Upsert and return the item as stored
    pub fn put_media(&self, item: &MediaItem) -> StoreResult<MediaItem> {
        self.with_conn(|conn| upsert(conn, item))
    }

    /// Per-item upsert of many items inside one transaction
    pub fn put_media_batch(&self, items: &[MediaItem]) -> StoreResult<Vec<MediaItem>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut stored = Vec::with_capacity(items.len());
            for item in items {
                stored.push(upsert(&tx, item)?);
            }
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Upsert `items` and drop `removed` in one transaction; rows not named
    /// in either are left untouched
    pub fn reconcile_media(&self, items: &[MediaItem], removed: &[String]) -> StoreResult<Vec<MediaItem>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut stored = Vec::with_capacity(items.len());
            for item in items {
                stored.push(upsert(&tx, item)?);
            }
            for id in removed {
                tx.execute("DELETE FROM media WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Returns false when there was nothing to delete
    pub fn delete_media(&self, id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM media WHERE id = ?1", params![id])? > 0))
    }

    pub fn query_media(&self, query: &MediaQuery) -> StoreResult<Vec<MediaItem>> {
        let (sql, values) = query.to_sql();
        self.with_conn(|conn| collect_items(conn, &sql, values))
    }

    pub fn media_count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use media_sync_models::MediaDraft;

    fn item(title: &str, media_type: MediaType) -> MediaItem {
        MediaDraft::new(title, media_type).into_item(Utc::now())
    }

    #[test]
    fn test_put_recomputes_derived_fields() {
        let store = LocalStore::in_memory().unwrap();
        let mut dune = item("Dune", MediaType::Book);
        dune.title = "Dune: Part Two!".to_string();
        dune.total_units = 4;
        dune.progress = 1;

        let stored = store.put_media(&dune).unwrap();
        assert_eq!(stored.normalized_title, "duneparttwo");
        assert_eq!(stored.completion_percent, 25.0);
        assert_eq!(store.get_media(&dune.id).unwrap().unwrap(), stored);
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let store = LocalStore::in_memory().unwrap();
        let current = item("Arcane", MediaType::Show);
        store.put_media(&current).unwrap();

        let mut stale = current.clone();
        stale.progress = 3;
        stale.updated_at = current.updated_at - Duration::hours(2);
        let stored = store.put_media(&stale).unwrap();

        assert_eq!(stored.progress, 3);
        assert_eq!(stored.updated_at, current.updated_at);

        let mut newer = current.clone();
        newer.updated_at = current.updated_at + Duration::seconds(1);
        assert_eq!(store.put_media(&newer).unwrap().updated_at, newer.updated_at);
    }

    #[test]
    fn test_all_media_newest_first() {
        let store = LocalStore::in_memory().unwrap();
        let mut older = item("Older", MediaType::Movie);
        older.updated_at = older.updated_at - Duration::days(1);
        let newer = item("Newer", MediaType::Movie);
        store.put_media_batch(&[older.clone(), newer.clone()]).unwrap();

        let ids: Vec<_> = store.all_media().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_delete_media() {
        let store = LocalStore::in_memory().unwrap();
        let dune = item("Dune", MediaType::Book);
        store.put_media(&dune).unwrap();

        assert!(store.delete_media(&dune.id).unwrap());
        assert!(!store.delete_media(&dune.id).unwrap());
        assert!(store.get_media(&dune.id).unwrap().is_none());
    }

    #[test]
    fn test_query_media() {
        let store = LocalStore::in_memory().unwrap();
        let mut frieren = item("Frieren", MediaType::Anime);
        frieren.status = MediaStatus::InProgress;
        frieren.is_favorite = true;
        frieren.release_year = Some(2023);
        let mut fma = item("Fullmetal Alchemist", MediaType::Anime);
        fma.release_year = Some(2009);
        let mut hades = item("Hades", MediaType::Game);
        hades.release_year = Some(2020);
        store.put_media_batch(&[frieren.clone(), fma.clone(), hades]).unwrap();

        let anime = store.query_media(&MediaQuery::new().media_type(MediaType::Anime)).unwrap();
        assert_eq!(anime.len(), 2);

        let watching = store
            .query_media(&MediaQuery::new().status(MediaStatus::InProgress).favorite(true))
            .unwrap();
        assert_eq!(watching.len(), 1);
        assert_eq!(watching[0].id, frieren.id);

        let by_prefix = store.query_media(&MediaQuery::new().title_prefix("Full-metal")).unwrap();
        assert_eq!(by_prefix.len(), 1);
        assert_eq!(by_prefix[0].id, fma.id);

        let recent = store.query_media(&MediaQuery::new().years(Some(2015), None)).unwrap();
        assert_eq!(recent.len(), 2);

        let limited = store.query_media(&MediaQuery::new().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_reconcile_media_upserts_and_removes() {
        let store = LocalStore::in_memory().unwrap();
        let keep = item("Keep", MediaType::Movie);
        let gone = item("Gone", MediaType::Movie);
        store.put_media_batch(&[keep.clone(), gone.clone()]).unwrap();

        let added = item("Added", MediaType::Movie);
        store.reconcile_media(&[added.clone()], &[gone.id.clone()]).unwrap();

        assert!(store.get_media(&keep.id).unwrap().is_some());
        assert!(store.get_media(&added.id).unwrap().is_some());
        assert!(store.get_media(&gone.id).unwrap().is_none());
        assert_eq!(store.media_count().unwrap(), 2);
    }
}
