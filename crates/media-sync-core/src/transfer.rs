//! Export document validation. Writing the document out is the caller's job.

use media_sync_models::{ExportDocument, MediaItem, SmartCollection, EXPORT_VERSION};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{StoreError, SyncError, SyncResult};

/// Check a document before it replaces the local library and return its
/// contents with derived fields recomputed
pub fn prepare_import(document: ExportDocument) -> SyncResult<(Vec<MediaItem>, Vec<SmartCollection>)> {
    if document.version != EXPORT_VERSION {
        return Err(SyncError::UnsupportedExportVersion {
            found: document.version,
            expected: EXPORT_VERSION,
        });
    }

    let mut seen = HashSet::new();
    let mut media = Vec::with_capacity(document.media.len());
    for mut item in document.media {
        check_id("media", &item.id, &mut seen)?;
        if item.title.trim().is_empty() {
            return Err(SyncError::Invalid(format!("media {} has an empty title", item.id)));
        }
        item.refresh_derived();
        media.push(item);
    }

    let mut seen = HashSet::new();
    for collection in &document.collections {
        check_id("collection", &collection.id, &mut seen)?;
    }

    Ok((media, document.collections))
}

fn check_id(kind: &str, id: &str, seen: &mut HashSet<String>) -> SyncResult<()> {
    if id.trim().is_empty() {
        return Err(SyncError::Invalid(format!("{} with an empty id", kind)));
    }
    if !seen.insert(id.to_string()) {
        return Err(SyncError::Invalid(format!("duplicate {} id {}", kind, id)));
    }
    Ok(())
}

pub fn read_document(path: impl AsRef<Path>) -> SyncResult<ExportDocument> {
    let content = std::fs::read_to_string(path).map_err(StoreError::from)?;
    Ok(serde_json::from_str(&content).map_err(StoreError::from)?)
}

pub fn write_document(document: &ExportDocument, path: impl AsRef<Path>) -> SyncResult<()> {
    let content = serde_json::to_string_pretty(document).map_err(StoreError::from)?;
    std::fs::write(path, content).map_err(StoreError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use media_sync_models::{CollectionDraft, MediaDraft, MediaType};

    #[test]
    fn test_rejects_other_versions() {
        let mut document = ExportDocument::new(Vec::new(), Vec::new());
        document.version = 2;
        assert!(matches!(
            prepare_import(document),
            Err(SyncError::UnsupportedExportVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let item = MediaDraft::new("Dune", MediaType::Movie).into_item(Utc::now());
        let document = ExportDocument::new(vec![item.clone(), item], Vec::new());
        assert!(matches!(prepare_import(document), Err(SyncError::Invalid(_))));
    }

    #[test]
    fn test_recomputes_derived_fields() {
        let mut item = MediaDraft::new("Cowboy Bebop", MediaType::Anime)
            .with_units(13, 26)
            .into_item(Utc::now());
        item.normalized_title = String::new();
        item.completion_percent = 0.0;
        let collection = CollectionDraft::new("Space").into_collection(Utc::now());

        let (media, collections) = prepare_import(ExportDocument::new(vec![item], vec![collection])).unwrap();
        assert_eq!(media[0].normalized_title, "cowboybebop");
        assert_eq!(media[0].completion_percent, 50.0);
        assert_eq!(collections.len(), 1);
    }

    #[test]
    fn test_document_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let item = MediaDraft::new("Dune", MediaType::Movie).into_item(Utc::now());
        write_document(&ExportDocument::new(vec![item.clone()], Vec::new()), &path).unwrap();

        let document = read_document(&path).unwrap();
        assert_eq!(document.version, EXPORT_VERSION);
        assert_eq!(document.media, vec![item]);
    }
}
