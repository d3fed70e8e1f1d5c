use async_trait::async_trait;
use media_sync_models::RemoteTable;
use serde_json::Value;

use crate::error::RemoteError;
use crate::traits::{Order, RemoteStore};

const REASON: &str = "no remote store configured";

/// Stand-in when no backend is configured; every write ends up queued
#[derive(Debug, Clone, Default)]
pub struct DisconnectedRemote;

impl DisconnectedRemote {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteStore for DisconnectedRemote {
    fn name(&self) -> &str {
        "disconnected"
    }

    async fn insert(&self, _table: RemoteTable, _row: Value) -> Result<Value, RemoteError> {
        Err(RemoteError::Unavailable(REASON.to_string()))
    }

    async fn update(&self, _table: RemoteTable, _id: &str, _fields: Value) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(REASON.to_string()))
    }

    async fn delete(&self, _table: RemoteTable, _id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(REASON.to_string()))
    }

    async fn select(&self, _table: RemoteTable, _order: Order) -> Result<Vec<Value>, RemoteError> {
        Err(RemoteError::Unavailable(REASON.to_string()))
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(REASON.to_string()))
    }
}
