use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Immutable audit record of a change to a library entry.
///
/// `media_id` is a weak reference: the entry may since have been deleted,
/// and the event outlives it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEvent {
    pub id: String,
    pub media_id: String,
    pub action_type: HistoryAction,
    #[serde(default)]
    pub value: Option<Map<String, Value>>,
    #[serde(default)]
    pub previous_value: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Added,
    Updated,
    StatusChange,
    ProgressUpdate,
    Favorited,
    Unfavorited,
    Archived,
    Unarchived,
    Deleted,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Added => "added",
            HistoryAction::Updated => "updated",
            HistoryAction::StatusChange => "status_change",
            HistoryAction::ProgressUpdate => "progress_update",
            HistoryAction::Favorited => "favorited",
            HistoryAction::Unfavorited => "unfavorited",
            HistoryAction::Archived => "archived",
            HistoryAction::Unarchived => "unarchived",
            HistoryAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(HistoryAction::Added),
            "updated" => Ok(HistoryAction::Updated),
            "status_change" => Ok(HistoryAction::StatusChange),
            "progress_update" => Ok(HistoryAction::ProgressUpdate),
            "favorited" => Ok(HistoryAction::Favorited),
            "unfavorited" => Ok(HistoryAction::Unfavorited),
            "archived" => Ok(HistoryAction::Archived),
            "unarchived" => Ok(HistoryAction::Unarchived),
            "deleted" => Ok(HistoryAction::Deleted),
            other => Err(format!("Unknown history action: {}", other)),
        }
    }
}

impl HistoryEvent {
    pub fn new(
        media_id: impl Into<String>,
        action_type: HistoryAction,
        value: Option<Map<String, Value>>,
        previous_value: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_id: media_id.into(),
            action_type,
            value,
            previous_value,
            created_at: Utc::now(),
        }
    }
}
