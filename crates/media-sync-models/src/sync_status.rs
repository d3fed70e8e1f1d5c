use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of synchronization state for display.
///
/// Rebuilt from live sources (connectivity, queue length, reconcile state)
/// every time it is published; it is never the source of truth itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_changes: usize,
    /// Queued writes the remote store permanently rejected
    pub dead_letters: usize,
}

impl SyncStatus {
    /// True when every local write has been confirmed by the remote store
    pub fn is_settled(&self) -> bool {
        self.pending_changes == 0 && !self.is_syncing
    }
}
