//! The sync coordinator: the single entry point the application layer uses
//! to read and write the library.

use chrono::Utc;
use futures::future::join_all;
use media_sync_config::Config;
use media_sync_models::{
    CollectionDraft, CollectionPatch, ExportDocument, HistoryEvent, MediaDraft, MediaItem, MediaPatch, MediaStatus,
    MutationMessage, MutationOp, RemoteTable, SmartCollection, SyncStatus,
};
use media_sync_remote::{RemoteError, RemoteStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectivity::Connectivity;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::history;
use crate::queue::MutationQueue;
use crate::status::StatusTracker;
use crate::store::LocalStore;
use crate::transfer;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Bound on every remote call; a hang becomes a queued retry
    pub remote_timeout: Duration,
    /// Permanent rejections before a queued entry is dead-lettered
    pub max_rejections: u32,
    /// Remote history events pulled per reconcile
    pub history_pull_limit: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(10),
            max_rejections: 5,
            history_pull_limit: 50,
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote_timeout: Duration::from_secs(config.remote.timeout_seconds.max(1)),
            max_rejections: config.sync.max_rejections.max(1),
            history_pull_limit: config.sync.history_pull_limit,
        }
    }
}

type RecordKey = (RemoteTable, String);

/// Per-record ordering for background writes: each write waits for the
/// previous one on the same record before it is sent.
#[derive(Default)]
struct Lanes {
    next_generation: u64,
    tails: HashMap<RecordKey, (u64, oneshot::Receiver<()>)>,
}

/// Deletes the remote confirmed while a pull was outstanding. That pull's
/// snapshot may predate them, so its merge treats them as pending deletes.
#[derive(Default)]
struct Tombstones {
    next_seq: u64,
    active_pulls: usize,
    confirmed: HashMap<RecordKey, u64>,
}

/// Registration of an outstanding remote pull; see [`SyncCoordinator::begin_pull`]
pub(crate) struct PullGuard {
    coordinator: SyncCoordinator,
    started: u64,
}

impl Drop for PullGuard {
    fn drop(&mut self) {
        let mut tombstones = lock(&self.coordinator.inner.tombstones);
        tombstones.active_pulls = tombstones.active_pulls.saturating_sub(1);
        if tombstones.active_pulls == 0 {
            tombstones.confirmed.clear();
        }
    }
}

pub(crate) struct Inner {
    pub(crate) store: LocalStore,
    pub(crate) queue: MutationQueue,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) connectivity: Connectivity,
    pub(crate) status: StatusTracker,
    pub(crate) options: CoordinatorOptions,
    pub(crate) drain_lock: tokio::sync::Mutex<()>,
    library: watch::Sender<Vec<MediaItem>>,
    inflight_deletes: Mutex<HashMap<RecordKey, usize>>,
    tombstones: Mutex<Tombstones>,
    lanes: Mutex<Lanes>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Service object tying the local store, mutation queue and remote store
/// together. Construct once at startup; clones share all state.
#[derive(Clone)]
pub struct SyncCoordinator {
    pub(crate) inner: Arc<Inner>,
}

/// Keeps a delete counted as pending until its background write has either
/// been confirmed or been queued
struct InflightDelete {
    coordinator: SyncCoordinator,
    key: RecordKey,
}

impl Drop for InflightDelete {
    fn drop(&mut self) {
        let mut inflight = lock(&self.coordinator.inner.inflight_deletes);
        if let Some(count) = inflight.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                inflight.remove(&self.key);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn to_row<T: Serialize>(value: &T) -> SyncResult<Value> {
    serde_json::to_value(value).map_err(|e| SyncError::LocalStore(StoreError::Serialization(e)))
}

/// Row as sent to the remote `media` table; `normalized_title` is derived there
pub(crate) fn media_row(item: &MediaItem) -> SyncResult<Value> {
    let mut row = to_row(item)?;
    if let Value::Object(map) = &mut row {
        map.remove("normalized_title");
    }
    Ok(row)
}

/// Field-level set for a media update, including the derived values the
/// patch affected
fn media_update_fields(patch: &MediaPatch, before: &MediaItem, after: &MediaItem) -> SyncResult<Map<String, Value>> {
    let mut fields = patch.to_fields();
    fields.insert("updated_at".to_string(), to_row(&after.updated_at)?);
    if patch.progress.is_some() || patch.total_units.is_some() || patch.completion_percent.is_some() {
        fields.insert("completion_percent".to_string(), to_row(&after.completion_percent)?);
    }
    if before.completed_at != after.completed_at {
        fields.insert("completed_at".to_string(), to_row(&after.completed_at)?);
    }
    Ok(fields)
}

impl SyncCoordinator {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
        options: CoordinatorOptions,
    ) -> SyncResult<Self> {
        let queue = MutationQueue::new(store.clone());
        let status = StatusTracker::new(connectivity.clone(), queue.clone(), store.clone());
        let (library, _rx) = watch::channel(store.all_media()?);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                queue,
                remote,
                connectivity,
                status,
                options,
                drain_lock: tokio::sync::Mutex::new(()),
                library,
                inflight_deletes: Mutex::new(HashMap::new()),
                tombstones: Mutex::new(Tombstones::default()),
                lanes: Mutex::new(Lanes::default()),
                background: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.inner.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    // -- media -----------------------------------------------------------

    /// Create an item locally and return it at once. The remote insert runs
    /// in the background; any failure leaves it queued.
    pub fn add(&self, draft: MediaDraft) -> SyncResult<MediaItem> {
        if draft.title.trim().is_empty() {
            return Err(SyncError::Invalid("title must not be empty".to_string()));
        }

        let item = self.inner.store.put_media(&draft.into_item(Utc::now()))?;
        let event = history::added(&item);
        self.inner.store.append_history(&event)?;
        self.publish_library()?;
        info!(operation = "add", id = %item.id, title = %item.title, "Added media");

        self.dispatch(MutationMessage::insert(RemoteTable::Media, &item.id, media_row(&item)?))?;
        self.dispatch_history(&event)?;
        Ok(item)
    }

    /// Apply `patch` locally, log the matching history event and push the
    /// changed fields. Unknown ids are [`SyncError::NotFound`].
    pub fn update(&self, id: &str, patch: MediaPatch) -> SyncResult<MediaItem> {
        let before = self
            .inner
            .store
            .get_media(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(before);
        }
        if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
            return Err(SyncError::Invalid("title must not be empty".to_string()));
        }

        let now = Utc::now();
        let mut after = before.clone();
        patch.apply_to(&mut after);
        if patch.status == Some(MediaStatus::Completed) && after.completed_at.is_none() {
            after.completed_at = Some(now);
        }
        after.updated_at = now;
        let after = self.inner.store.put_media(&after)?;

        let event = history::classify_update(&before, &after, &patch);
        self.inner.store.append_history(&event)?;
        self.publish_library()?;
        info!(operation = "update", id = %id, action = %event.action_type, "Updated media");

        let fields = media_update_fields(&patch, &before, &after)?;
        self.dispatch(MutationMessage::update(RemoteTable::Media, id, Value::Object(fields)))?;
        self.dispatch_history(&event)?;
        Ok(after)
    }

    /// Log a `deleted` event, drop the item locally and push the delete.
    /// Earlier history for the id is kept.
    pub fn delete(&self, id: &str) -> SyncResult<()> {
        let item = self
            .inner
            .store
            .get_media(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let event = history::deleted(&item);
        self.inner.store.append_history(&event)?;
        self.inner.store.delete_media(id)?;
        self.publish_library()?;
        info!(operation = "delete", id = %id, title = %item.title, "Deleted media");

        self.dispatch(MutationMessage::delete(RemoteTable::Media, id))?;
        self.dispatch_history(&event)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> SyncResult<Option<MediaItem>> {
        Ok(self.inner.store.get_media(id)?)
    }

    /// Last published library snapshot
    pub fn library(&self) -> Vec<MediaItem> {
        self.inner.library.borrow().clone()
    }

    pub fn subscribe_library(&self) -> watch::Receiver<Vec<MediaItem>> {
        self.inner.library.subscribe()
    }

    pub(crate) fn publish_library(&self) -> SyncResult<Vec<MediaItem>> {
        let items = self.inner.store.all_media()?;
        self.publish(items.clone());
        Ok(items)
    }

    pub(crate) fn publish(&self, items: Vec<MediaItem>) {
        self.inner.library.send_replace(items);
    }

    // -- collections -----------------------------------------------------

    pub fn collections(&self) -> SyncResult<Vec<SmartCollection>> {
        Ok(self.inner.store.all_collections()?)
    }

    pub fn add_collection(&self, draft: CollectionDraft) -> SyncResult<SmartCollection> {
        if draft.title.trim().is_empty() {
            return Err(SyncError::Invalid("collection title must not be empty".to_string()));
        }
        let collection = self.inner.store.put_collection(&draft.into_collection(Utc::now()))?;
        info!(operation = "add_collection", id = %collection.id, title = %collection.title, "Added collection");

        self.dispatch(MutationMessage::insert(
            RemoteTable::SmartCollections,
            &collection.id,
            to_row(&collection)?,
        ))?;
        Ok(collection)
    }

    pub fn update_collection(&self, id: &str, patch: CollectionPatch) -> SyncResult<SmartCollection> {
        let mut collection = self
            .inner
            .store
            .get_collection(id)?
            .ok_or_else(|| SyncError::CollectionNotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(collection);
        }
        if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
            return Err(SyncError::Invalid("collection title must not be empty".to_string()));
        }

        patch.apply_to(&mut collection);
        collection.updated_at = Utc::now();
        let collection = self.inner.store.put_collection(&collection)?;
        info!(operation = "update_collection", id = %id, "Updated collection");

        let mut fields = patch.to_fields();
        fields.insert("updated_at".to_string(), to_row(&collection.updated_at)?);
        self.dispatch(MutationMessage::update(RemoteTable::SmartCollections, id, Value::Object(fields)))?;
        Ok(collection)
    }

    pub fn delete_collection(&self, id: &str) -> SyncResult<()> {
        if !self.inner.store.delete_collection(id)? {
            return Err(SyncError::CollectionNotFound(id.to_string()));
        }
        info!(operation = "delete_collection", id = %id, "Deleted collection");
        self.dispatch(MutationMessage::delete(RemoteTable::SmartCollections, id))
    }

    // -- history ---------------------------------------------------------

    pub fn history(&self, limit: usize) -> SyncResult<Vec<HistoryEvent>> {
        Ok(self.inner.store.recent_history(limit)?)
    }

    pub fn history_for(&self, media_id: &str) -> SyncResult<Vec<HistoryEvent>> {
        Ok(self.inner.store.history_for(media_id)?)
    }

    fn dispatch_history(&self, event: &HistoryEvent) -> SyncResult<()> {
        self.dispatch(MutationMessage::insert(RemoteTable::History, &event.id, to_row(event)?))
    }

    // -- status and queue ------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Re-read connectivity, queue and last sync and publish the result
    pub fn refresh_status(&self) -> SyncStatus {
        self.inner.status.refresh()
    }

    pub fn pending(&self) -> SyncResult<Vec<MutationMessage>> {
        Ok(self.inner.queue.drain()?)
    }

    pub fn dead_letters(&self) -> SyncResult<Vec<MutationMessage>> {
        Ok(self.inner.queue.dead_letters()?)
    }

    pub fn retry_dead_letters(&self) -> SyncResult<usize> {
        let requeued = self.inner.queue.retry_dead_letters()?;
        info!(operation = "retry_dead_letters", requeued, "Requeued dead letters");
        self.inner.status.refresh();
        Ok(requeued)
    }

    pub fn clear_dead_letters(&self) -> SyncResult<usize> {
        let cleared = self.inner.queue.clear_dead_letters()?;
        info!(operation = "clear_dead_letters", cleared, "Discarded dead letters");
        self.inner.status.refresh();
        Ok(cleared)
    }

    // -- export / import / wipe ------------------------------------------

    pub fn export(&self) -> SyncResult<ExportDocument> {
        Ok(ExportDocument::new(
            self.inner.store.all_media()?,
            self.inner.store.all_collections()?,
        ))
    }

    /// Replace local media and collections with the document's contents.
    /// Returns the number of media items and collections imported.
    pub fn import(&self, document: ExportDocument) -> SyncResult<(usize, usize)> {
        let (media, collections) = transfer::prepare_import(document)?;
        self.inner.store.replace_all(&media, &collections)?;
        self.publish_library()?;
        info!(
            operation = "import",
            media = media.len(),
            collections = collections.len(),
            "Imported library"
        );
        Ok((media.len(), collections.len()))
    }

    /// Clear every local table (logout/reset)
    pub fn wipe(&self) -> SyncResult<()> {
        self.inner.store.wipe()?;
        self.publish(Vec::new());
        self.inner.status.refresh();
        warn!(operation = "wipe", "Local data wiped");
        Ok(())
    }

    // -- background delivery ---------------------------------------------

    /// Wait for every background remote write started so far (and any they
    /// start in turn) to finish
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.inner.background));
            if handles.is_empty() {
                break;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    error!(error = %e, "Background remote write panicked");
                }
            }
        }
    }

    pub(crate) fn enqueue(&self, message: &MutationMessage) -> SyncResult<()> {
        self.inner.queue.append(message)?;
        self.inner.status.refresh();
        Ok(())
    }

    /// Register a remote pull. Must be taken before the remote is read and
    /// held until its merge has been stored.
    pub(crate) fn begin_pull(&self) -> PullGuard {
        let mut tombstones = lock(&self.inner.tombstones);
        tombstones.active_pulls += 1;
        PullGuard {
            coordinator: self.clone(),
            started: tombstones.next_seq,
        }
    }

    /// Ids the merge for `pull` must keep out: deletes that are queued,
    /// still in flight, or confirmed after `pull` began. A confirmed delete is
    /// tombstoned before it leaves the queue or the in-flight set, and the
    /// tombstone lock is held across all three reads, so none slips through.
    pub(crate) fn pending_deletes(&self, table: RemoteTable, pull: &PullGuard) -> SyncResult<HashSet<String>> {
        let tombstones = lock(&self.inner.tombstones);
        let mut ids: HashSet<String> = lock(&self.inner.inflight_deletes)
            .keys()
            .filter(|(key_table, _)| *key_table == table)
            .map(|(_, id)| id.clone())
            .collect();
        ids.extend(
            tombstones
                .confirmed
                .iter()
                .filter(|((key_table, _), seq)| *key_table == table && **seq > pull.started)
                .map(|((_, id), _)| id.clone()),
        );
        ids.extend(self.inner.queue.pending_delete_ids(table)?);
        Ok(ids)
    }

    /// Bookkeeping once the remote accepted `message`. Runs before an
    /// in-flight delete stops counting as pending.
    pub(crate) fn confirmed(&self, message: &MutationMessage, row: Option<Value>) {
        if message.operation == MutationOp::Delete {
            let mut tombstones = lock(&self.inner.tombstones);
            if tombstones.active_pulls > 0 {
                tombstones.next_seq += 1;
                let seq = tombstones.next_seq;
                tombstones
                    .confirmed
                    .insert((message.table, message.record_id.clone()), seq);
            }
        }
        self.apply_server_row(message, row);
    }

    /// Send `message` in the background, or queue it straight away when
    /// offline, outside a runtime, or behind unconfirmed writes for the same
    /// record
    fn dispatch(&self, message: MutationMessage) -> SyncResult<()> {
        if !self.inner.connectivity.is_online() {
            return self.enqueue(&message);
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return self.enqueue(&message),
        };
        if self.inner.queue.has_unconfirmed(message.table, &message.record_id)? {
            return self.enqueue(&message);
        }

        let key: RecordKey = (message.table, message.record_id.clone());
        let inflight = (message.operation == MutationOp::Delete).then(|| {
            *lock(&self.inner.inflight_deletes).entry(key.clone()).or_insert(0) += 1;
            InflightDelete {
                coordinator: self.clone(),
                key: key.clone(),
            }
        });

        let (done_tx, done_rx) = oneshot::channel();
        let (generation, previous) = {
            let mut lanes = lock(&self.inner.lanes);
            lanes.next_generation += 1;
            let generation = lanes.next_generation;
            let previous = lanes.tails.insert(key.clone(), (generation, done_rx)).map(|(_, rx)| rx);
            (generation, previous)
        };

        let this = self.clone();
        let task = handle.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            this.deliver_or_queue(message).await;
            drop(inflight);
            drop(done_tx);

            let mut lanes = lock(&this.inner.lanes);
            if lanes.tails.get(&key).map(|(g, _)| *g) == Some(generation) {
                lanes.tails.remove(&key);
            }
        });

        let mut background = lock(&self.inner.background);
        background.retain(|task| !task.is_finished());
        background.push(task);
        Ok(())
    }

    async fn deliver_or_queue(&self, message: MutationMessage) {
        // An earlier write for this record may have been queued meanwhile
        match self.inner.queue.has_unconfirmed(message.table, &message.record_id) {
            Ok(false) => {}
            Ok(true) => {
                self.queue_after_failure(&message, "queued behind earlier pending writes");
                return;
            }
            Err(e) => {
                error!(error = %e, "Could not read mutation queue");
                self.queue_after_failure(&message, "local store error");
                return;
            }
        }

        match self.send(&message).await {
            Ok(row) => {
                debug!(
                    table = %message.table,
                    operation = %message.operation,
                    record_id = %message.record_id,
                    "Remote write confirmed"
                );
                self.confirmed(&message, row);
            }
            Err(e) => {
                debug!(
                    table = %message.table,
                    operation = %message.operation,
                    record_id = %message.record_id,
                    error = %e,
                    "Remote write failed, queuing"
                );
                self.queue_after_failure(&message, &e.to_string());
            }
        }
    }

    fn queue_after_failure(&self, message: &MutationMessage, reason: &str) {
        let mut message = message.clone();
        message.last_error = Some(reason.to_string());
        if let Err(e) = self.enqueue(&message) {
            error!(
                operation = "enqueue",
                record_id = %message.record_id,
                error = %e,
                "Could not queue mutation, it will not be retried"
            );
        }
    }

    /// One remote call for `message`, bounded by the configured timeout
    pub(crate) async fn send(&self, message: &MutationMessage) -> Result<Option<Value>, RemoteError> {
        let remote = self.inner.remote.as_ref();
        let call = async {
            match message.operation {
                MutationOp::Insert => remote.insert(message.table, message.payload.clone()).await.map(Some),
                MutationOp::Update => remote
                    .update(message.table, &message.record_id, message.payload.clone())
                    .await
                    .map(|_| None),
                MutationOp::Delete => remote.delete(message.table, &message.record_id).await.map(|_| None),
            }
        };
        match tokio::time::timeout(self.inner.options.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// Adopt the row the server returned for an insert, unless the local copy
    /// is gone or has been edited since the insert was issued
    fn apply_server_row(&self, message: &MutationMessage, row: Option<Value>) {
        let Some(row) = row else { return };
        if message.operation != MutationOp::Insert {
            return;
        }

        let result: SyncResult<bool> = match message.table {
            RemoteTable::Media => self.adopt_media_row(row),
            RemoteTable::SmartCollections => self.adopt_collection_row(row),
            RemoteTable::History => Ok(false),
        };
        match result {
            Ok(true) => debug!(table = %message.table, record_id = %message.record_id, "Adopted server row"),
            Ok(false) => {}
            Err(e) => warn!(
                table = %message.table,
                record_id = %message.record_id,
                error = %e,
                "Could not adopt server row"
            ),
        }
    }

    fn adopt_media_row(&self, row: Value) -> SyncResult<bool> {
        let server: MediaItem = serde_json::from_value(row).map_err(StoreError::from)?;
        match self.inner.store.get_media(&server.id)? {
            Some(local) if local.updated_at <= server.updated_at => {
                self.inner.store.put_media(&server)?;
                self.publish_library()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn adopt_collection_row(&self, row: Value) -> SyncResult<bool> {
        let server: SmartCollection = serde_json::from_value(row).map_err(StoreError::from)?;
        match self.inner.store.get_collection(&server.id)? {
            Some(local) if local.updated_at <= server.updated_at => {
                self.inner.store.put_collection(&server)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
