use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::{MediaItem, MediaType, StreamingPlatform};
use crate::serde_helpers::double_option;
use crate::status::MediaStatus;

/// A partial update to a [`MediaItem`].
///
/// Only the fields that are `Some` are applied and serialized, which makes the
/// serialized form a field-level set that is safe to replay. Nullable columns
/// use `Option<Option<T>>`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub poster_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub backdrop_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub release_year: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub api_rating: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studios: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_units: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MediaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub user_rating: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_platforms: Option<Vec<StreamingPlatform>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub tmdb_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub mal_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub rawg_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub google_books_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl MediaPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(status: MediaStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u32) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Self::default()
        }
    }

    pub fn archived(is_archived: bool) -> Self {
        Self {
            is_archived: Some(is_archived),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Copy every set field onto `item`. Derived fields are not touched here.
    pub fn apply_to(&self, item: &mut MediaItem) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(media_type) = self.media_type {
            item.media_type = media_type;
        }
        if let Some(value) = &self.poster_url {
            item.poster_url = value.clone();
        }
        if let Some(value) = &self.backdrop_url {
            item.backdrop_url = value.clone();
        }
        if let Some(value) = &self.description {
            item.description = value.clone();
        }
        if let Some(value) = self.release_year {
            item.release_year = value;
        }
        if let Some(value) = self.api_rating {
            item.api_rating = value;
        }
        if let Some(value) = &self.genres {
            item.genres = value.clone();
        }
        if let Some(value) = &self.tags {
            item.tags = value.clone();
        }
        if let Some(value) = &self.studios {
            item.studios = value.clone();
        }
        if let Some(value) = self.total_units {
            item.total_units = value;
        }
        if let Some(value) = self.progress {
            item.progress = value;
        }
        if let Some(value) = self.completion_percent {
            item.completion_percent = value;
        }
        if let Some(value) = self.status {
            item.status = value;
        }
        if let Some(value) = self.is_favorite {
            item.is_favorite = value;
        }
        if let Some(value) = self.is_archived {
            item.is_archived = value;
        }
        if let Some(value) = &self.notes {
            item.notes = value.clone();
        }
        if let Some(value) = self.user_rating {
            item.user_rating = value;
        }
        if let Some(value) = &self.streaming_platforms {
            item.streaming_platforms = value.clone();
        }
        if let Some(value) = self.tmdb_id {
            item.ids.tmdb_id = value;
        }
        if let Some(value) = self.mal_id {
            item.ids.mal_id = value;
        }
        if let Some(value) = self.rawg_id {
            item.ids.rawg_id = value;
        }
        if let Some(value) = &self.google_books_id {
            item.ids.google_books_id = value.clone();
        }
        if let Some(value) = self.completed_at {
            item.completed_at = value;
        }
    }

    /// The set fields as a JSON object, keyed by column name
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaDraft;

    #[test]
    fn test_to_fields_only_contains_set_fields() {
        let patch = MediaPatch {
            progress: Some(12),
            notes: Some(None),
            ..MediaPatch::default()
        };
        let fields = patch.to_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["progress"], serde_json::json!(12));
        assert_eq!(fields["notes"], Value::Null);
    }

    #[test]
    fn test_explicit_null_clears_value() {
        let patch: MediaPatch = serde_json::from_str(r#"{"notes": null, "status": "dropped"}"#).unwrap();
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.user_rating, None);

        let mut item = MediaDraft::new("Severance", MediaType::Show).into_item(Utc::now());
        item.notes = Some("season 2 pending".to_string());
        patch.apply_to(&mut item);
        assert_eq!(item.notes, None);
        assert_eq!(item.status, MediaStatus::Dropped);
    }

    #[test]
    fn test_is_empty() {
        assert!(MediaPatch::new().is_empty());
        assert!(!MediaPatch::favorite(true).is_empty());
    }
}
