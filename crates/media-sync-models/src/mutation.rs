use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Remote tables the library is mirrored into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTable {
    Media,
    History,
    SmartCollections,
}

impl RemoteTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteTable::Media => "media",
            RemoteTable::History => "history",
            RemoteTable::SmartCollections => "smart_collections",
        }
    }
}

impl fmt::Display for RemoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(RemoteTable::Media),
            "history" => Ok(RemoteTable::History),
            "smart_collections" => Ok(RemoteTable::SmartCollections),
            other => Err(format!("Unknown remote table: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    /// Upsert by id
    Insert,
    /// Field-level set
    Update,
    /// Delete if exists
    Delete,
}

impl MutationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOp::Insert => "insert",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(MutationOp::Insert),
            "update" => Ok(MutationOp::Update),
            "delete" => Ok(MutationOp::Delete),
            other => Err(format!("Unknown mutation operation: {}", other)),
        }
    }
}

/// A write that has not yet been confirmed against the remote store.
///
/// `payload` is the full row for inserts, the changed fields for updates and
/// `{"id": ...}` for deletes. `attempts` and `last_error` are bookkeeping for
/// the dead-letter policy and never alter what gets replayed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationMessage {
    pub id: String,
    pub table: RemoteTable,
    pub operation: MutationOp,
    pub record_id: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl MutationMessage {
    pub fn new(table: RemoteTable, operation: MutationOp, record_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            table,
            operation,
            record_id: record_id.into(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn insert(table: RemoteTable, record_id: impl Into<String>, row: Value) -> Self {
        Self::new(table, MutationOp::Insert, record_id, row)
    }

    pub fn update(table: RemoteTable, record_id: impl Into<String>, fields: Value) -> Self {
        Self::new(table, MutationOp::Update, record_id, fields)
    }

    pub fn delete(table: RemoteTable, record_id: impl Into<String>) -> Self {
        let record_id = record_id.into();
        let payload = serde_json::json!({ "id": record_id });
        Self::new(table, MutationOp::Delete, record_id, payload)
    }
}
