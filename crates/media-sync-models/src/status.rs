use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tracking status of a library entry.
///
/// Serialized with the values the remote `media` table stores, so
/// "in progress" travels as `watching`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    /// Want to start at some point
    #[default]
    Planned,
    /// Currently watching, reading or playing
    #[serde(rename = "watching", alias = "in_progress")]
    InProgress,
    Completed,
    OnHold,
    Dropped,
    /// Going through it again after completing it
    Rewatching,
    Archived,
}

impl MediaStatus {
    pub const ALL: [MediaStatus; 7] = [
        MediaStatus::Planned,
        MediaStatus::InProgress,
        MediaStatus::Completed,
        MediaStatus::OnHold,
        MediaStatus::Dropped,
        MediaStatus::Rewatching,
        MediaStatus::Archived,
    ];

    /// Value stored in the database column and sent over the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Planned => "planned",
            MediaStatus::InProgress => "watching",
            MediaStatus::Completed => "completed",
            MediaStatus::OnHold => "on_hold",
            MediaStatus::Dropped => "dropped",
            MediaStatus::Rewatching => "rewatching",
            MediaStatus::Archived => "archived",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaStatus::Planned => "Planned",
            MediaStatus::InProgress => "In Progress",
            MediaStatus::Completed => "Completed",
            MediaStatus::OnHold => "On Hold",
            MediaStatus::Dropped => "Dropped",
            MediaStatus::Rewatching => "Rewatching",
            MediaStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "planned" => Ok(MediaStatus::Planned),
            "watching" | "in_progress" | "reading" | "playing" => Ok(MediaStatus::InProgress),
            "completed" | "done" => Ok(MediaStatus::Completed),
            "on_hold" | "hold" => Ok(MediaStatus::OnHold),
            "dropped" => Ok(MediaStatus::Dropped),
            "rewatching" => Ok(MediaStatus::Rewatching),
            "archived" => Ok(MediaStatus::Archived),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_uses_remote_spelling() {
        let json = serde_json::to_string(&MediaStatus::InProgress).unwrap();
        assert_eq!(json, "\"watching\"");
        let parsed: MediaStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(parsed, MediaStatus::InProgress);
    }

    #[test]
    fn test_from_str_accepts_cli_spellings() {
        assert_eq!("on-hold".parse::<MediaStatus>().unwrap(), MediaStatus::OnHold);
        assert_eq!("Completed".parse::<MediaStatus>().unwrap(), MediaStatus::Completed);
        assert!("finished-ish".parse::<MediaStatus>().is_err());
    }
}
