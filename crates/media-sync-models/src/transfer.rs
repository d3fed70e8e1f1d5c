use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::SmartCollection;
use crate::media::MediaItem;

pub const EXPORT_VERSION: u32 = 1;

/// Full dump of the library, as written by export and accepted by import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default, alias = "smartCollections")]
    pub collections: Vec<SmartCollection>,
}

impl ExportDocument {
    pub fn new(media: Vec<MediaItem>, collections: Vec<SmartCollection>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            media,
            collections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_legacy_collection_key() {
        let json = r#"{
            "version": 1,
            "exported_at": "2025-01-05T12:00:00Z",
            "media": [],
            "smartCollections": [{
                "id": "c1",
                "title": "Comfort rewatches",
                "media_ids": ["m1", "m2"],
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z"
            }]
        }"#;
        let doc: ExportDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.collections.len(), 1);
        assert_eq!(doc.collections[0].media_ids, vec!["m1", "m2"]);
        assert!(doc.collections[0].description.is_none());
    }
}
