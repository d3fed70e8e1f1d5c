use async_trait::async_trait;
use media_sync_models::RemoteTable;
use serde_json::Value;

use crate::error::RemoteError;

/// Sort (and optional row cap) for [`RemoteStore::select`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
    pub limit: Option<usize>,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
            limit: None,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Shared backend the local library is reconciled against.
///
/// Every write must be idempotent under replay: insert is an upsert by id,
/// update is a field-level set and delete succeeds when the row is already
/// gone. The mutation queue delivers at least once and relies on this.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;

    /// Upsert `row` by its `id`; returns the row as stored
    async fn insert(&self, table: RemoteTable, row: Value) -> Result<Value, RemoteError>;

    async fn update(&self, table: RemoteTable, id: &str, fields: Value) -> Result<(), RemoteError>;

    async fn delete(&self, table: RemoteTable, id: &str) -> Result<(), RemoteError>;

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError>;

    /// Cheap reachability check used by the connectivity probe
    async fn ping(&self) -> Result<(), RemoteError>;
}
