use chrono::Utc;
use media_sync_models::{HistoryEvent, MediaItem, MutationMessage, RemoteTable, SmartCollection};
use media_sync_remote::{Order, RemoteError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::coordinator::{media_row, PullGuard, SyncCoordinator};
use crate::error::SyncResult;
use crate::merge::merge_records;

/// What a single [`SyncCoordinator::fetch`] did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Queue entries confirmed by the remote this cycle
    pub drained: usize,
    /// Entries left alone because an earlier write for the same record failed
    pub skipped: usize,
    pub still_pending: usize,
    pub dead_lettered: usize,
    pub pulled: usize,
    pub local_only: usize,
    pub excluded_pending_deletes: usize,
    /// Local-only items queued for insert after an empty remote pull
    pub backfilled: usize,
    pub collections_pulled: usize,
    pub history_pulled: usize,
    pub remote_error: Option<String>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.remote_error.is_none() && self.still_pending == 0 && self.dead_lettered == 0
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

/// Result of a fetch: the published library plus the report
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub media: Vec<MediaItem>,
    pub report: ReconcileReport,
}

#[derive(Debug, Default)]
struct DrainSummary {
    drained: usize,
    skipped: usize,
    dead_lettered: usize,
}

fn decode_rows<T: DeserializeOwned>(table: RemoteTable, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table = %table, error = %e, "Skipping undecodable remote row");
                None
            }
        })
        .collect()
}

impl SyncCoordinator {
    /// Reconcile the local library with the remote store.
    ///
    /// The local list is published first. When online the queue is drained,
    /// the remote set pulled and merged, and the merged list published and
    /// returned. Remote failures degrade to the local list and are reported
    /// in [`ReconcileReport::remote_error`]; only local store failures are errors.
    pub async fn fetch(&self) -> SyncResult<Reconciled> {
        let started = Instant::now();
        let local = self.publish_library()?;
        let mut report = ReconcileReport::default();

        if !self.inner.connectivity.is_online() {
            report.still_pending = self.inner.queue.len()?;
            report.remote_error = Some(RemoteError::Unavailable("offline".to_string()).to_string());
            report.duration = started.elapsed();
            debug!(operation = "fetch", pending = report.still_pending, "Offline, serving local library");
            return Ok(Reconciled { media: local, report });
        }

        let _syncing = self.inner.status.begin_sync();
        let pull = self.begin_pull();
        let summary = self.drain_queue().await?;
        report.drained = summary.drained;
        report.skipped = summary.skipped;
        report.dead_lettered = summary.dead_lettered;

        let rows = match self.select(RemoteTable::Media, Order::desc("updated_at")).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(operation = "fetch", error = %e, "Remote pull failed, keeping local library");
                report.still_pending = self.inner.queue.len()?;
                report.remote_error = Some(e.to_string());
                report.duration = started.elapsed();
                self.inner.status.refresh();
                return Ok(Reconciled { media: local, report });
            }
        };
        let remote: Vec<MediaItem> = decode_rows(RemoteTable::Media, rows);

        let pending = self.pending_deletes(RemoteTable::Media, &pull)?;
        let current = self.inner.store.all_media()?;
        let outcome = merge_records(&current, remote, &pending);
        self.inner.store.reconcile_media(&outcome.merged, &outcome.removed)?;
        report.pulled = outcome.pulled;
        report.local_only = outcome.local_only;
        report.excluded_pending_deletes = outcome.excluded;

        if outcome.pulled == 0 && !current.is_empty() {
            report.backfilled = self.backfill(&current, &pending)?;
        }

        report.collections_pulled = self.pull_collections(&pull).await;
        report.history_pulled = self.pull_history().await;

        self.inner.store.set_last_sync(Utc::now())?;
        let media = self.publish_library()?;
        report.still_pending = self.inner.queue.len()?;
        report.duration = started.elapsed();
        self.inner.status.refresh();

        info!(
            operation = "fetch",
            drained = report.drained,
            pulled = report.pulled,
            local_only = report.local_only,
            excluded = report.excluded_pending_deletes,
            still_pending = report.still_pending,
            dead_lettered = report.dead_lettered,
            duration_ms = report.duration.as_millis() as u64,
            "Reconcile complete"
        );
        Ok(Reconciled { media, report })
    }

    /// Replay queued mutations oldest first. An entry is removed only after
    /// the remote confirmed it. Once a write for a record fails, later
    /// entries for that record wait for the next cycle.
    async fn drain_queue(&self) -> SyncResult<DrainSummary> {
        let _drain = self.inner.drain_lock.lock().await;
        let queue = &self.inner.queue;
        let mut summary = DrainSummary::default();
        let mut blocked: HashSet<(RemoteTable, String)> = HashSet::new();

        for message in queue.drain()? {
            let key = (message.table, message.record_id.clone());
            if blocked.contains(&key) {
                summary.skipped += 1;
                continue;
            }
            // Another process may have delivered it already
            if !queue.contains(&message.id)? {
                continue;
            }
            // An older write for this record was given up on; replaying this
            // one first would invert their order
            if queue.has_dead_letter(message.table, &message.record_id)? {
                summary.dead_lettered += queue.dead_letter(&message.id, "held behind a dead-lettered write")?;
                blocked.insert(key);
                continue;
            }

            match self.send(&message).await {
                Ok(row) => {
                    self.confirmed(&message, row);
                    queue.remove(&message.id)?;
                    summary.drained += 1;
                }
                Err(e) if e.is_transient() => {
                    debug!(record_id = %message.record_id, error = %e, "Replay failed, will retry");
                    queue.note_error(&message.id, &e.to_string())?;
                    blocked.insert(key);
                }
                Err(e) => {
                    let attempts = queue.record_failure(&message.id, &e.to_string())?;
                    warn!(
                        table = %message.table,
                        operation = %message.operation,
                        record_id = %message.record_id,
                        attempts,
                        error = %e,
                        "Remote rejected queued mutation"
                    );
                    if attempts >= self.inner.options.max_rejections {
                        summary.dead_lettered += queue.dead_letter(&message.id, &e.to_string())?;
                    }
                    blocked.insert(key);
                }
            }
        }

        self.inner.status.refresh();
        Ok(summary)
    }

    /// Queue inserts for local items the remote has never seen. Only runs
    /// after an empty pull, so a wiped or fresh remote is repopulated.
    fn backfill(&self, local: &[MediaItem], pending_deletes: &HashSet<String>) -> SyncResult<usize> {
        let mut queued = 0;
        for item in local {
            if pending_deletes.contains(&item.id)
                || self.inner.queue.has_pending(RemoteTable::Media, &item.id)?
                || self.inner.queue.has_dead_letter(RemoteTable::Media, &item.id)?
            {
                continue;
            }
            self.enqueue(&MutationMessage::insert(RemoteTable::Media, &item.id, media_row(item)?))?;
            queued += 1;
        }
        if queued > 0 {
            info!(operation = "backfill", queued, "Remote library empty, queued local items for upload");
        }
        Ok(queued)
    }

    async fn pull_collections(&self, pull: &PullGuard) -> usize {
        self.try_pull_collections(pull).await.unwrap_or_else(|e| {
            warn!(operation = "pull_collections", error = %e, "Could not store pulled collections");
            0
        })
    }

    async fn try_pull_collections(&self, pull: &PullGuard) -> SyncResult<usize> {
        let rows = match self.select(RemoteTable::SmartCollections, Order::desc("updated_at")).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(operation = "pull_collections", error = %e, "Collection pull failed");
                return Ok(0);
            }
        };
        let remote: Vec<SmartCollection> = decode_rows(RemoteTable::SmartCollections, rows);
        let pending = self.pending_deletes(RemoteTable::SmartCollections, pull)?;
        let local = self.inner.store.all_collections()?;
        let outcome = merge_records(&local, remote, &pending);
        self.inner.store.reconcile_collections(&outcome.merged, &outcome.removed)?;
        Ok(outcome.pulled)
    }

    async fn pull_history(&self) -> usize {
        let limit = self.inner.options.history_pull_limit;
        if limit == 0 {
            return 0;
        }
        let rows = match self.select(RemoteTable::History, Order::desc("created_at").limit(limit)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(operation = "pull_history", error = %e, "History pull failed");
                return 0;
            }
        };
        let events: Vec<HistoryEvent> = decode_rows(RemoteTable::History, rows);
        match self.inner.store.merge_history(&events) {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(operation = "pull_history", error = %e, "Could not store pulled history");
                0
            }
        }
    }

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError> {
        let call = self.inner.remote.select(table, order);
        match tokio::time::timeout(self.inner.options.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }
}
