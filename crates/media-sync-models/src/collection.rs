use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaType;
use crate::serde_helpers::{double_option, null_as_default};
use crate::status::MediaStatus;

/// A named, user-curated (or saved-filter) group of library entries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmartCollection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_ids: Vec<String>,
    #[serde(default)]
    pub filter_criteria: Option<FilterCriteria>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_auto_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Saved filter a collection can be defined by instead of (or besides) explicit ids
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<MediaStatus>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<Vec<MediaType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media_ids: Vec<String>,
    #[serde(default)]
    pub filter_criteria: Option<FilterCriteria>,
    #[serde(default)]
    pub is_auto_generated: bool,
}

impl CollectionDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            media_ids: Vec::new(),
            filter_criteria: None,
            is_auto_generated: false,
        }
    }

    pub fn into_collection(self, now: DateTime<Utc>) -> SmartCollection {
        SmartCollection {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title,
            description: self.description,
            media_ids: self.media_ids,
            filter_criteria: self.filter_criteria,
            is_auto_generated: self.is_auto_generated,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub filter_criteria: Option<Option<FilterCriteria>>,
}

impl CollectionPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.media_ids.is_none() && self.filter_criteria.is_none()
    }

    pub fn apply_to(&self, collection: &mut SmartCollection) {
        if let Some(title) = &self.title {
            collection.title = title.clone();
        }
        if let Some(description) = &self.description {
            collection.description = description.clone();
        }
        if let Some(media_ids) = &self.media_ids {
            collection.media_ids = media_ids.clone();
        }
        if let Some(criteria) = &self.filter_criteria {
            collection.filter_criteria = criteria.clone();
        }
    }

    pub fn to_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
