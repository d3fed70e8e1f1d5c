//! Reconcile rule for a pulled remote record set.
//!
//! final = (remote - D) + local-only, where D is the set of ids with a pending
//! delete and local-only means "not in the pulled set and not in D". An empty
//! or partial pull therefore never shrinks the local library.

use media_sync_models::{MediaItem, SmartCollection};
use std::collections::HashSet;

/// Anything merged by id
pub trait Record: Clone {
    fn record_id(&self) -> &str;
}

impl Record for MediaItem {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for SmartCollection {
    fn record_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    /// Remote records (pending deletes excluded) followed by local-only ones
    pub merged: Vec<T>,
    /// Local records that must go because a delete for them is pending
    pub removed: Vec<String>,
    pub pulled: usize,
    pub local_only: usize,
    pub excluded: usize,
}

/// Merge `remote` into `local`. Remote wins for every id it contains, except
/// ids in `pending_deletes`. Duplicate remote ids keep their first occurrence.
pub fn merge_records<T: Record>(local: &[T], remote: Vec<T>, pending_deletes: &HashSet<String>) -> MergeOutcome<T> {
    let pulled = remote.len();
    let mut remote_ids = HashSet::with_capacity(remote.len());
    let mut merged = Vec::with_capacity(remote.len() + local.len());
    let mut excluded = 0;

    for record in remote {
        if !remote_ids.insert(record.record_id().to_string()) {
            continue;
        }
        if pending_deletes.contains(record.record_id()) {
            excluded += 1;
            continue;
        }
        merged.push(record);
    }

    let mut local_only = 0;
    let mut removed = Vec::new();
    for record in local {
        let id = record.record_id();
        if pending_deletes.contains(id) {
            removed.push(id.to_string());
        } else if !remote_ids.contains(id) {
            merged.push(record.clone());
            local_only += 1;
        }
    }

    MergeOutcome {
        merged,
        removed,
        pulled,
        local_only,
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use media_sync_models::{MediaDraft, MediaStatus, MediaType};

    fn item(title: &str) -> MediaItem {
        MediaDraft::new(title, MediaType::Movie).into_item(Utc::now())
    }

    fn ids<T: Record>(records: &[T]) -> Vec<&str> {
        records.iter().map(|r| r.record_id()).collect()
    }

    #[test]
    fn test_empty_remote_keeps_local_library() {
        let local = vec![item("Alien"), item("Aliens"), item("Alien 3")];
        let outcome = merge_records(&local, Vec::new(), &HashSet::new());

        assert_eq!(outcome.merged.len(), 3);
        assert_eq!(outcome.local_only, 3);
        assert_eq!(outcome.pulled, 0);
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn test_pending_delete_beats_stale_remote() {
        let kept = item("Heat");
        let deleted = item("Ronin");
        let pending = HashSet::from([deleted.id.clone()]);

        let outcome = merge_records(&[kept.clone()], vec![kept.clone(), deleted.clone()], &pending);
        assert_eq!(ids(&outcome.merged), vec![kept.id.as_str()]);
        assert_eq!(outcome.excluded, 1);
    }

    #[test]
    fn test_remote_wins_for_shared_ids() {
        let mut local = item("Severance");
        local.status = MediaStatus::InProgress;
        let mut remote = local.clone();
        remote.status = MediaStatus::Completed;

        let outcome = merge_records(&[local], vec![remote], &HashSet::new());
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].status, MediaStatus::Completed);
        assert_eq!(outcome.local_only, 0);
    }

    #[test]
    fn test_local_copy_of_pending_delete_is_removed() {
        let doomed = item("Cats");
        let pending = HashSet::from([doomed.id.clone()]);
        let outcome = merge_records(&[doomed.clone()], Vec::new(), &pending);

        assert!(outcome.merged.is_empty());
        assert_eq!(outcome.removed, vec![doomed.id]);
    }

    #[test]
    fn test_duplicate_remote_rows_keep_first() {
        let newest = item("Dune");
        let mut older = newest.clone();
        older.progress = 1;
        let outcome = merge_records::<MediaItem>(&[], vec![newest.clone(), older], &HashSet::new());

        assert_eq!(outcome.merged, vec![newest]);
        assert_eq!(outcome.pulled, 2);
    }

    #[test]
    fn test_union_preserves_offline_additions() {
        let shared = item("Jaws");
        let offline = item("Tremors");
        let remote_only = item("Arrival");

        let outcome = merge_records(
            &[shared.clone(), offline.clone()],
            vec![remote_only.clone(), shared.clone()],
            &HashSet::new(),
        );
        assert_eq!(
            ids(&outcome.merged),
            vec![remote_only.id.as_str(), shared.id.as_str(), offline.id.as_str()]
        );
        assert_eq!(outcome.local_only, 1);
    }
}
