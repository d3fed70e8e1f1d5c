use serde::{Deserialize, Serialize};

/// Cross-reference ids into the external catalogs a title was imported from
///
/// Flattened into the `media` row, so each id is its own nullable column
/// (`tmdb_id`, `mal_id`, `rawg_id`, `google_books_id`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ExternalIds {
    #[serde(default)]
    pub tmdb_id: Option<i64>,
    #[serde(default)]
    pub mal_id: Option<i64>,
    #[serde(default)]
    pub rawg_id: Option<i64>,
    #[serde(default)]
    pub google_books_id: Option<String>,
}

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the best available catalog reference, formatted as `catalog:id`
    pub fn primary_id(&self) -> Option<String> {
        self.tmdb_id
            .map(|id| format!("tmdb:{}", id))
            .or_else(|| self.mal_id.map(|id| format!("mal:{}", id)))
            .or_else(|| self.rawg_id.map(|id| format!("rawg:{}", id)))
            .or_else(|| self.google_books_id.as_ref().map(|id| format!("google_books:{}", id)))
    }

    /// Fill in ids missing from `self` with the ones known to `other`.
    /// Existing values are not overwritten.
    pub fn merge(&mut self, other: &ExternalIds) {
        if self.tmdb_id.is_none() {
            self.tmdb_id = other.tmdb_id;
        }
        if self.mal_id.is_none() {
            self.mal_id = other.mal_id;
        }
        if self.rawg_id.is_none() {
            self.rawg_id = other.rawg_id;
        }
        if self.google_books_id.is_none() {
            self.google_books_id = other.google_books_id.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tmdb_id.is_none()
            && self.mal_id.is_none()
            && self.rawg_id.is_none()
            && self.google_books_id.is_none()
    }

    /// Check if a specific catalog id is available ("tmdb", "mal", "rawg", "google_books")
    pub fn has_id(&self, catalog: &str) -> bool {
        match catalog.to_lowercase().as_str() {
            "tmdb" => self.tmdb_id.is_some(),
            "mal" => self.mal_id.is_some(),
            "rawg" => self.rawg_id.is_some(),
            "google_books" | "books" => self.google_books_id.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing_values() {
        let mut ids = ExternalIds {
            tmdb_id: Some(438631),
            ..ExternalIds::default()
        };
        let other = ExternalIds {
            tmdb_id: Some(1),
            mal_id: Some(5114),
            ..ExternalIds::default()
        };
        ids.merge(&other);
        assert_eq!(ids.tmdb_id, Some(438631));
        assert_eq!(ids.mal_id, Some(5114));
        assert!(ids.has_id("mal"));
        assert!(!ids.has_id("rawg"));
    }

    #[test]
    fn test_primary_id_prefers_tmdb() {
        let ids = ExternalIds {
            tmdb_id: Some(10),
            google_books_id: Some("abc".to_string()),
            ..ExternalIds::default()
        };
        assert_eq!(ids.primary_id().as_deref(), Some("tmdb:10"));
        assert!(ExternalIds::new().primary_id().is_none());
        assert!(ExternalIds::new().is_empty());
    }
}
