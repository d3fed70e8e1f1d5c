use chrono::{DateTime, Utc};
use media_sync_models::SyncStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::connectivity::Connectivity;
use crate::queue::MutationQueue;
use crate::store::LocalStore;

/// Rebuilds [`SyncStatus`] from its live sources and publishes it.
#[derive(Clone)]
pub struct StatusTracker {
    connectivity: Connectivity,
    queue: MutationQueue,
    store: LocalStore,
    syncing: Arc<AtomicUsize>,
    tx: Arc<watch::Sender<SyncStatus>>,
}

/// Marks a reconcile as running until dropped
pub struct SyncingGuard {
    tracker: StatusTracker,
}

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        self.tracker.syncing.fetch_sub(1, Ordering::SeqCst);
        self.tracker.refresh();
    }
}

impl StatusTracker {
    pub fn new(connectivity: Connectivity, queue: MutationQueue, store: LocalStore) -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        let tracker = Self {
            connectivity,
            queue,
            store,
            syncing: Arc::new(AtomicUsize::new(0)),
            tx: Arc::new(tx),
        };
        tracker.refresh();
        tracker
    }

    pub fn snapshot(&self) -> SyncStatus {
        let pending_changes = self.queue.len().unwrap_or_else(|e| {
            warn!(error = %e, "Could not count pending changes");
            0
        });
        let dead_letters = self.queue.dead_letter_count().unwrap_or_else(|e| {
            warn!(error = %e, "Could not count dead letters");
            0
        });
        let last_sync: Option<DateTime<Utc>> = self.store.last_sync().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read last sync time");
            None
        });

        SyncStatus {
            is_online: self.connectivity.is_online(),
            is_syncing: self.syncing.load(Ordering::SeqCst) > 0,
            last_sync,
            pending_changes,
            dead_letters,
        }
    }

    /// Rebuild and publish; subscribers are only woken when something changed
    pub fn refresh(&self) -> SyncStatus {
        let status = self.snapshot();
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        status
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn begin_sync(&self) -> SyncingGuard {
        self.syncing.fetch_add(1, Ordering::SeqCst);
        self.refresh();
        SyncingGuard { tracker: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_models::{MutationMessage, RemoteTable};

    #[test]
    fn test_status_rebuilt_from_sources() {
        let store = LocalStore::in_memory().unwrap();
        let queue = MutationQueue::new(store.clone());
        let connectivity = Connectivity::offline();
        let tracker = StatusTracker::new(connectivity.clone(), queue.clone(), store.clone());
        let rx = tracker.subscribe();

        queue.append(&MutationMessage::delete(RemoteTable::Media, "m1")).unwrap();
        connectivity.set_online(true);
        let status = tracker.refresh();

        assert!(status.is_online);
        assert_eq!(status.pending_changes, 1);
        assert!(!status.is_settled());
        assert_eq!(*rx.borrow(), status);
    }

    #[test]
    fn test_syncing_guard() {
        let store = LocalStore::in_memory().unwrap();
        let tracker = StatusTracker::new(Connectivity::online(), MutationQueue::new(store.clone()), store);

        let outer = tracker.begin_sync();
        let inner = tracker.begin_sync();
        drop(outer);
        assert!(tracker.snapshot().is_syncing);
        drop(inner);
        assert!(!tracker.snapshot().is_syncing);
        assert!(tracker.snapshot().is_settled());
    }
}
