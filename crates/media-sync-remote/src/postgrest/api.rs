use media_sync_models::RemoteTable;
use reqwest::Response;
use serde_json::Value;

use crate::error::RemoteError;
use crate::traits::Order;

pub const REST_PATH: &str = "rest/v1";

/// Insert doubles as upsert-by-id so a replayed insert is a no-op
pub const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";
pub const MINIMAL_PREFER: &str = "return=minimal";

pub fn rest_root(base_url: &str) -> String {
    format!("{}/{}/", base_url.trim_end_matches('/'), REST_PATH)
}

pub fn table_url(base_url: &str, table: RemoteTable) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), REST_PATH, table.as_str())
}

/// Row filter for a single id (`?id=eq.<id>`)
pub fn record_url(base_url: &str, table: RemoteTable, id: &str) -> String {
    format!("{}?id=eq.{}", table_url(base_url, table), urlencoding::encode(id))
}

pub fn select_url(base_url: &str, table: RemoteTable, order: &Order) -> String {
    let direction = if order.ascending { "asc" } else { "desc" };
    let mut url = format!(
        "{}?select=*&order={}.{}",
        table_url(base_url, table),
        urlencoding::encode(&order.column),
        direction
    );
    if let Some(limit) = order.limit {
        url.push_str(&format!("&limit={}", limit));
    }
    url
}

/// Pass successful responses through, map the rest to a [`RemoteError`]
pub async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), &body))
}

/// PostgREST answers with a JSON array; an empty body means no representation
pub fn parse_rows(body: &str) -> Result<Vec<Value>, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        row @ Value::Object(_) => Ok(vec![row]),
        other => Err(RemoteError::Decode(format!("expected an array of rows, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_and_record_urls() {
        assert_eq!(
            table_url("https://abc.supabase.co/", RemoteTable::SmartCollections),
            "https://abc.supabase.co/rest/v1/smart_collections"
        );
        assert_eq!(
            record_url("https://abc.supabase.co", RemoteTable::Media, "a b&c"),
            "https://abc.supabase.co/rest/v1/media?id=eq.a%20b%26c"
        );
        assert_eq!(rest_root("http://localhost:54321"), "http://localhost:54321/rest/v1/");
    }

    #[test]
    fn test_select_url() {
        assert_eq!(
            select_url("https://abc.supabase.co", RemoteTable::Media, &Order::desc("updated_at")),
            "https://abc.supabase.co/rest/v1/media?select=*&order=updated_at.desc"
        );
        assert_eq!(
            select_url("https://abc.supabase.co", RemoteTable::History, &Order::desc("created_at").limit(50)),
            "https://abc.supabase.co/rest/v1/history?select=*&order=created_at.desc&limit=50"
        );
    }

    #[test]
    fn test_parse_rows() {
        assert!(parse_rows("").unwrap().is_empty());
        assert_eq!(parse_rows(r#"[{"id":"1"}]"#).unwrap(), vec![json!({"id": "1"})]);
        assert_eq!(parse_rows(r#"{"id":"1"}"#).unwrap(), vec![json!({"id": "1"})]);
        assert!(matches!(parse_rows("42"), Err(RemoteError::Decode(_))));
        assert!(matches!(parse_rows("<html>"), Err(RemoteError::Decode(_))));
    }
}
