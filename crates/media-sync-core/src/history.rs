//! Turns local writes into history events.

use media_sync_models::{HistoryAction, HistoryEvent, MediaItem, MediaPatch};
use serde_json::{json, Map, Value};

fn object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

pub fn added(item: &MediaItem) -> HistoryEvent {
    HistoryEvent::new(
        &item.id,
        HistoryAction::Added,
        object(json!({ "title": item.title, "type": item.media_type })),
        None,
    )
}

/// Captures the identity of the item, which is gone once the delete lands
pub fn deleted(item: &MediaItem) -> HistoryEvent {
    HistoryEvent::new(
        &item.id,
        HistoryAction::Deleted,
        None,
        object(json!({ "title": item.title, "type": item.media_type })),
    )
}

/// Classify an update by the first field that actually changes, in priority
/// order status, progress, favorite, archived. Anything else is a generic
/// `updated` carrying the whole patch.
pub fn classify_update(before: &MediaItem, after: &MediaItem, patch: &MediaPatch) -> HistoryEvent {
    let (action, value, previous) = if patch.status.is_some_and(|status| status != before.status) {
        (
            HistoryAction::StatusChange,
            json!({ "status": after.status }),
            Some(json!({ "status": before.status })),
        )
    } else if patch.progress.is_some_and(|progress| progress != before.progress) {
        (
            HistoryAction::ProgressUpdate,
            json!({ "progress": after.progress, "completion_percent": after.completion_percent }),
            Some(json!({ "progress": before.progress, "completion_percent": before.completion_percent })),
        )
    } else if let Some(favorite) = patch.is_favorite.filter(|favorite| *favorite != before.is_favorite) {
        let action = if favorite {
            HistoryAction::Favorited
        } else {
            HistoryAction::Unfavorited
        };
        (action, json!({ "is_favorite": favorite }), Some(json!({ "is_favorite": before.is_favorite })))
    } else if let Some(archived) = patch.is_archived.filter(|archived| *archived != before.is_archived) {
        let action = if archived {
            HistoryAction::Archived
        } else {
            HistoryAction::Unarchived
        };
        (action, json!({ "is_archived": archived }), Some(json!({ "is_archived": before.is_archived })))
    } else {
        (HistoryAction::Updated, Value::Object(patch.to_fields()), None)
    };

    HistoryEvent::new(&before.id, action, object(value), previous.and_then(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use media_sync_models::{MediaDraft, MediaStatus, MediaType};

    fn apply(before: &MediaItem, patch: &MediaPatch) -> MediaItem {
        let mut after = before.clone();
        patch.apply_to(&mut after);
        after.refresh_derived();
        after
    }

    fn show() -> MediaItem {
        MediaDraft::new("Shogun", MediaType::Show)
            .with_status(MediaStatus::InProgress)
            .with_units(3, 10)
            .into_item(Utc::now())
    }

    #[test]
    fn test_status_change_wins_over_progress() {
        let before = show();
        let patch = MediaPatch {
            status: Some(MediaStatus::Completed),
            progress: Some(10),
            ..MediaPatch::default()
        };
        let event = classify_update(&before, &apply(&before, &patch), &patch);

        assert_eq!(event.action_type, HistoryAction::StatusChange);
        assert_eq!(event.value.unwrap()["status"], json!("completed"));
        assert_eq!(event.previous_value.unwrap()["status"], json!("watching"));
    }

    #[test]
    fn test_progress_update_carries_percent() {
        let before = show();
        let patch = MediaPatch::progress(5);
        let event = classify_update(&before, &apply(&before, &patch), &patch);

        assert_eq!(event.action_type, HistoryAction::ProgressUpdate);
        let value = event.value.unwrap();
        assert_eq!(value["progress"], json!(5));
        assert_eq!(value["completion_percent"], json!(50.0));
        assert_eq!(event.previous_value.unwrap()["progress"], json!(3));
    }

    #[test]
    fn test_favorite_and_archive_toggles() {
        let before = show();
        let patch = MediaPatch::favorite(true);
        assert_eq!(
            classify_update(&before, &apply(&before, &patch), &patch).action_type,
            HistoryAction::Favorited
        );

        let mut archived = show();
        archived.is_archived = true;
        let patch = MediaPatch::archived(false);
        assert_eq!(
            classify_update(&archived, &apply(&archived, &patch), &patch).action_type,
            HistoryAction::Unarchived
        );
    }

    #[test]
    fn test_unchanged_status_is_generic_update() {
        let before = show();
        let patch = MediaPatch {
            status: Some(MediaStatus::InProgress),
            notes: Some(Some("great score".to_string())),
            ..MediaPatch::default()
        };
        let event = classify_update(&before, &apply(&before, &patch), &patch);

        assert_eq!(event.action_type, HistoryAction::Updated);
        assert_eq!(event.value.unwrap()["notes"], json!("great score"));
        assert!(event.previous_value.is_none());
    }

    #[test]
    fn test_deleted_captures_identity() {
        let item = show();
        let event = deleted(&item);
        assert_eq!(event.action_type, HistoryAction::Deleted);
        assert!(event.value.is_none());
        assert_eq!(event.previous_value.unwrap()["title"], json!("Shogun"));
    }
}
