use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::media_ids::ExternalIds;
use crate::serde_helpers::null_as_default;
use crate::status::MediaStatus;

/// A single tracked title in the library.
///
/// The JSON shape matches a row of the remote `media` table; `normalized_title`
/// and (when `total_units > 0`) `completion_percent` are derived and recomputed
/// by [`MediaItem::refresh_derived`] before every local write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub normalized_title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub api_rating: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub studios: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_units: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_percent: f64,
    #[serde(default)]
    pub status: MediaStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_archived: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_rating: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub streaming_platforms: Vec<StreamingPlatform>,
    #[serde(flatten)]
    pub ids: ExternalIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    #[serde(rename = "tv", alias = "show")]
    Show,
    Anime,
    Manga,
    Manhwa,
    Manhua,
    Donghua,
    Game,
    Book,
    LightNovel,
    VisualNovel,
    WebSeries,
    Misc,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Show => "tv",
            MediaType::Anime => "anime",
            MediaType::Manga => "manga",
            MediaType::Manhwa => "manhwa",
            MediaType::Manhua => "manhua",
            MediaType::Donghua => "donghua",
            MediaType::Game => "game",
            MediaType::Book => "book",
            MediaType::LightNovel => "light_novel",
            MediaType::VisualNovel => "visual_novel",
            MediaType::WebSeries => "web_series",
            MediaType::Misc => "misc",
        }
    }

    /// What one unit of progress counts for this type
    pub fn unit_label(&self) -> &'static str {
        match self {
            MediaType::Movie => "parts",
            MediaType::Show | MediaType::Anime | MediaType::Donghua | MediaType::WebSeries => "episodes",
            MediaType::Manga | MediaType::Manhwa | MediaType::Manhua | MediaType::LightNovel => "chapters",
            MediaType::Game => "hours",
            MediaType::Book => "pages",
            MediaType::VisualNovel => "routes",
            MediaType::Misc => "items",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "movie" | "film" => Ok(MediaType::Movie),
            "tv" | "show" | "series" => Ok(MediaType::Show),
            "anime" => Ok(MediaType::Anime),
            "manga" => Ok(MediaType::Manga),
            "manhwa" => Ok(MediaType::Manhwa),
            "manhua" => Ok(MediaType::Manhua),
            "donghua" => Ok(MediaType::Donghua),
            "game" => Ok(MediaType::Game),
            "book" => Ok(MediaType::Book),
            "light_novel" => Ok(MediaType::LightNovel),
            "visual_novel" => Ok(MediaType::VisualNovel),
            "web_series" => Ok(MediaType::WebSeries),
            "misc" => Ok(MediaType::Misc),
            other => Err(format!("Unknown media type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamingPlatform {
    pub platform: String,
    #[serde(rename = "type")]
    pub kind: PlatformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Subscription,
    Rent,
    Buy,
}

/// Caller-supplied fields for a new library entry; everything but the
/// title and type has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaDraft {
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub backdrop_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub api_rating: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub studios: Vec<String>,
    #[serde(default)]
    pub total_units: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub status: MediaStatus,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_rating: Option<f64>,
    #[serde(default)]
    pub streaming_platforms: Vec<StreamingPlatform>,
    #[serde(flatten)]
    pub ids: ExternalIds,
}

impl MediaDraft {
    pub fn new(title: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            title: title.into(),
            media_type,
            poster_url: None,
            backdrop_url: None,
            description: None,
            release_year: None,
            api_rating: None,
            genres: Vec::new(),
            tags: Vec::new(),
            studios: Vec::new(),
            total_units: 0,
            progress: 0,
            status: MediaStatus::Planned,
            is_favorite: false,
            notes: None,
            user_rating: None,
            streaming_platforms: Vec::new(),
            ids: ExternalIds::default(),
        }
    }

    pub fn with_status(mut self, status: MediaStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_units(mut self, progress: u32, total_units: u32) -> Self {
        self.progress = progress;
        self.total_units = total_units;
        self
    }

    /// Turn the draft into a full item with a fresh id and both timestamps set to `now`
    pub fn into_item(self, now: DateTime<Utc>) -> MediaItem {
        let completed_at = (self.status == MediaStatus::Completed).then_some(now);
        let mut item = MediaItem {
            id: uuid::Uuid::new_v4().to_string(),
            normalized_title: String::new(),
            title: self.title,
            media_type: self.media_type,
            poster_url: self.poster_url,
            backdrop_url: self.backdrop_url,
            description: self.description,
            release_year: self.release_year,
            api_rating: self.api_rating,
            genres: self.genres,
            tags: self.tags,
            studios: self.studios,
            total_units: self.total_units,
            progress: self.progress,
            completion_percent: 0.0,
            status: self.status,
            is_favorite: self.is_favorite,
            is_archived: false,
            notes: self.notes,
            user_rating: self.user_rating,
            streaming_platforms: self.streaming_platforms,
            ids: self.ids,
            created_at: now,
            updated_at: now,
            completed_at,
        };
        item.refresh_derived();
        item
    }
}

impl MediaItem {
    /// Recompute the derived columns from the fields they depend on
    pub fn refresh_derived(&mut self) {
        self.normalized_title = normalize_title(&self.title);
        if self.total_units > 0 {
            let percent = self.progress as f64 / self.total_units as f64 * 100.0;
            self.completion_percent = percent.min(100.0);
        } else {
            self.completion_percent = self.completion_percent.clamp(0.0, 100.0);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == MediaStatus::Completed || self.completion_percent >= 100.0
    }
}

/// Lowercase and strip everything outside `[a-z0-9]`
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Dune: Part Two"), "duneparttwo");
        assert_eq!(normalize_title("  Neon Genesis Evangelion (1995) "), "neongenesisevangelion1995");
        assert_eq!(normalize_title("Pokémon"), "pokmon");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn test_draft_into_item_derives_fields() {
        let now = Utc::now();
        let item = MediaDraft::new("Frieren: Beyond Journey's End", MediaType::Anime)
            .with_units(7, 28)
            .into_item(now);

        assert_eq!(item.normalized_title, "frierenbeyondjourneysend");
        assert_eq!(item.completion_percent, 25.0);
        assert_eq!(item.created_at, now);
        assert_eq!(item.updated_at, now);
        assert!(item.completed_at.is_none());
        assert!(uuid::Uuid::parse_str(&item.id).is_ok());
    }

    #[test]
    fn test_completion_percent_is_capped() {
        let mut item = MediaDraft::new("Dune", MediaType::Book).with_units(900, 412).into_item(Utc::now());
        assert_eq!(item.completion_percent, 100.0);

        item.total_units = 0;
        item.completion_percent = 140.0;
        item.refresh_derived();
        assert_eq!(item.completion_percent, 100.0);
    }

    #[test]
    fn test_remote_row_with_nulls_deserializes() {
        let row = serde_json::json!({
            "id": "4f7c",
            "title": "Outer Wilds",
            "normalized_title": "outerwilds",
            "type": "game",
            "genres": null,
            "tags": ["space"],
            "progress": null,
            "status": "watching",
            "tmdb_id": null,
            "rawg_id": 28026,
            "ai_primary_tone": "wonder",
            "created_at": "2024-03-01T10:00:00.000000+00:00",
            "updated_at": "2024-03-02T10:00:00+00:00"
        });
        let item: MediaItem = serde_json::from_value(row).unwrap();
        assert!(item.genres.is_empty());
        assert_eq!(item.progress, 0);
        assert_eq!(item.status, MediaStatus::InProgress);
        assert_eq!(item.ids.rawg_id, Some(28026));
        assert_eq!(item.media_type, MediaType::Game);
    }

    #[test]
    fn test_show_is_stored_as_tv() {
        let value = serde_json::to_value(MediaType::Show).unwrap();
        assert_eq!(value, serde_json::json!("tv"));
        assert_eq!("show".parse::<MediaType>().unwrap(), MediaType::Show);
    }
}
