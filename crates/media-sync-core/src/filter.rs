//! Library filtering and sorting for display. Pure functions over a slice
//! of items; nothing here touches the store.

use media_sync_models::{MediaItem, MediaStatus, MediaType, Range};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Title,
    ReleaseYear,
    /// The catalogue rating (`api_rating`), not the user's own
    Rating,
    CompletionPercent,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "updated_at" | "updated" => Ok(SortField::UpdatedAt),
            "created_at" | "created" | "added" => Ok(SortField::CreatedAt),
            "title" => Ok(SortField::Title),
            "release_year" | "year" => Ok(SortField::ReleaseYear),
            "rating" | "api_rating" => Ok(SortField::Rating),
            "completion_percent" | "completion" | "progress" => Ok(SortField::CompletionPercent),
            other => Err(format!("Unknown sort field: {}", other)),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortField::UpdatedAt => "updated_at",
            SortField::CreatedAt => "created_at",
            SortField::Title => "title",
            SortField::ReleaseYear => "release_year",
            SortField::Rating => "rating",
            SortField::CompletionPercent => "completion_percent",
        };
        f.write_str(name)
    }
}

/// Filter drawer state. Empty sets and `None` mean "no constraint".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LibraryFilter {
    /// Case-insensitive substring match over title, description, genres and tags
    pub search: Option<String>,
    pub statuses: Vec<MediaStatus>,
    pub types: Vec<MediaType>,
    /// Any-of
    pub genres: Vec<String>,
    /// Any-of
    pub tags: Vec<String>,
    pub release_year: Option<Range>,
    pub rating: Option<Range>,
    pub favorite: Option<bool>,
    /// Archived items are only shown when this is set, and then only them
    pub archived: bool,
    pub sort: SortField,
    pub ascending: bool,
}

impl LibraryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn status(mut self, status: MediaStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.types.push(media_type);
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genres.push(genre.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn sort_by(mut self, sort: SortField, ascending: bool) -> Self {
        self.sort = sort;
        self.ascending = ascending;
        self
    }

    pub fn matches(&self, item: &MediaItem) -> bool {
        if item.is_archived != self.archived {
            return false;
        }
        if let Some(favorite) = self.favorite {
            if item.is_favorite != favorite {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&item.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&item.media_type) {
            return false;
        }
        if !self.genres.is_empty() && !any_of(&self.genres, &item.genres) {
            return false;
        }
        if !self.tags.is_empty() && !any_of(&self.tags, &item.tags) {
            return false;
        }
        if let Some(range) = &self.release_year {
            if !in_range(range, item.release_year.map(f64::from)) {
                return false;
            }
        }
        if let Some(range) = &self.rating {
            if !in_range(range, item.api_rating) {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => matches_search(item, &text.to_lowercase()),
            _ => true,
        }
    }

    /// Matching items, sorted
    pub fn apply(&self, items: &[MediaItem]) -> Vec<MediaItem> {
        let mut matched: Vec<MediaItem> = items.iter().filter(|item| self.matches(item)).cloned().collect();
        matched.sort_by(|a, b| self.compare(a, b));
        matched
    }

    fn compare(&self, a: &MediaItem, b: &MediaItem) -> Ordering {
        let directed = |ordering: Ordering| if self.ascending { ordering } else { ordering.reverse() };
        match self.sort {
            SortField::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at)),
            SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
            SortField::Title => directed(a.title.to_lowercase().cmp(&b.title.to_lowercase())),
            SortField::CompletionPercent => directed(a.completion_percent.total_cmp(&b.completion_percent)),
            SortField::ReleaseYear => nulls_last(a.release_year.map(f64::from), b.release_year.map(f64::from), directed),
            SortField::Rating => nulls_last(a.api_rating, b.api_rating, directed),
        }
    }
}

/// Missing values sort after present ones whichever the direction
fn nulls_last(a: Option<f64>, b: Option<f64>, directed: impl Fn(Ordering) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.total_cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn any_of(wanted: &[String], present: &[String]) -> bool {
    wanted
        .iter()
        .any(|w| present.iter().any(|p| p.eq_ignore_ascii_case(w)))
}

/// Items without a value never match a range
fn in_range(range: &Range, value: Option<f64>) -> bool {
    let Some(value) = value else { return false };
    range.min.map_or(true, |min| value >= min) && range.max.map_or(true, |max| value <= max)
}

fn matches_search(item: &MediaItem, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle)
        || item
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
        || item.genres.iter().any(|g| g.to_lowercase().contains(needle))
        || item.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use media_sync_models::MediaDraft;

    fn library() -> Vec<MediaItem> {
        let now = Utc::now();
        let mut dune = MediaDraft::new("Dune", MediaType::Movie).into_item(now - Duration::minutes(3));
        dune.genres = vec!["Sci-Fi".to_string()];
        dune.release_year = Some(2021);
        dune.api_rating = Some(8.0);
        dune.is_favorite = true;

        let mut frieren = MediaDraft::new("Frieren", MediaType::Anime)
            .with_status(MediaStatus::InProgress)
            .into_item(now - Duration::minutes(2));
        frieren.tags = vec!["fantasy".to_string()];
        frieren.description = Some("An elf mage outlives her party".to_string());
        frieren.release_year = Some(2023);

        let mut hades = MediaDraft::new("Hades", MediaType::Game)
            .with_status(MediaStatus::Completed)
            .into_item(now - Duration::minutes(1));
        hades.api_rating = Some(9.3);

        let mut old = MediaDraft::new("Lost", MediaType::Show).into_item(now);
        old.is_archived = true;

        vec![dune, frieren, hades, old]
    }

    fn titles(items: &[MediaItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_default_hides_archived_newest_first() {
        let items = LibraryFilter::new().apply(&library());
        assert_eq!(titles(&items), vec!["Hades", "Frieren", "Dune"]);

        let archived = LibraryFilter::new().archived(true).apply(&library());
        assert_eq!(titles(&archived), vec!["Lost"]);
    }

    #[test]
    fn test_search_covers_description_genres_and_tags() {
        let lib = library();
        assert_eq!(titles(&LibraryFilter::new().search("ELF").apply(&lib)), vec!["Frieren"]);
        assert_eq!(titles(&LibraryFilter::new().search("sci").apply(&lib)), vec!["Dune"]);
        assert_eq!(titles(&LibraryFilter::new().search("fantasy").apply(&lib)), vec!["Frieren"]);
        assert_eq!(LibraryFilter::new().search("   ").apply(&lib).len(), 3);
    }

    #[test]
    fn test_sets_are_any_of() {
        let filter = LibraryFilter::new()
            .status(MediaStatus::Completed)
            .status(MediaStatus::InProgress);
        assert_eq!(titles(&filter.apply(&library())), vec!["Hades", "Frieren"]);

        let filter = LibraryFilter::new().media_type(MediaType::Movie).favorite(true);
        assert_eq!(titles(&filter.apply(&library())), vec!["Dune"]);

        let filter = LibraryFilter::new().favorite(false);
        assert_eq!(titles(&filter.apply(&library())), vec!["Hades", "Frieren"]);
    }

    #[test]
    fn test_ranges_exclude_missing_values() {
        let filter = LibraryFilter {
            release_year: Some(Range {
                min: Some(2022.0),
                max: None,
            }),
            ..LibraryFilter::default()
        };
        assert_eq!(titles(&filter.apply(&library())), vec!["Frieren"]);
    }

    #[test]
    fn test_rating_sort_puts_unrated_last() {
        let desc = LibraryFilter::new().sort_by(SortField::Rating, false).apply(&library());
        assert_eq!(titles(&desc), vec!["Hades", "Dune", "Frieren"]);

        let asc = LibraryFilter::new().sort_by(SortField::Rating, true).apply(&library());
        assert_eq!(titles(&asc), vec!["Dune", "Hades", "Frieren"]);
    }

    #[test]
    fn test_sort_field_from_str() {
        assert_eq!("year".parse::<SortField>(), Ok(SortField::ReleaseYear));
        assert_eq!("Completion-Percent".parse::<SortField>(), Ok(SortField::CompletionPercent));
        assert!("color".parse::<SortField>().is_err());
    }
}
