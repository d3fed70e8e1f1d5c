#![allow(dead_code)]

use async_trait::async_trait;
use media_sync_core::{Connectivity, CoordinatorOptions, LocalStore, SyncCoordinator};
use media_sync_models::RemoteTable;
use media_sync_remote::{MemoryRemote, Order, RemoteError, RemoteStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn options() -> CoordinatorOptions {
    CoordinatorOptions {
        remote_timeout: Duration::from_secs(2),
        max_rejections: 3,
        history_pull_limit: 50,
    }
}

pub fn device(remote: &MemoryRemote, online: bool) -> SyncCoordinator {
    device_with(Arc::new(remote.clone()), online, options())
}

pub fn device_with(remote: Arc<dyn RemoteStore>, online: bool, options: CoordinatorOptions) -> SyncCoordinator {
    SyncCoordinator::new(
        LocalStore::in_memory().unwrap(),
        remote,
        Connectivity::new(online),
        options,
    )
    .unwrap()
}

/// Memory remote whose deletes wait until a permit is released
#[derive(Clone)]
pub struct GatedRemote {
    pub inner: MemoryRemote,
    pub gate: Arc<Semaphore>,
}

impl GatedRemote {
    pub fn new(inner: MemoryRemote) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    fn name(&self) -> &str {
        "gated"
    }

    async fn insert(&self, table: RemoteTable, row: Value) -> Result<Value, RemoteError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: RemoteTable, id: &str, fields: Value) -> Result<(), RemoteError> {
        self.inner.update(table, id, fields).await
    }

    async fn delete(&self, table: RemoteTable, id: &str) -> Result<(), RemoteError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        self.inner.delete(table, id).await
    }

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError> {
        self.inner.select(table, order).await
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.inner.ping().await
    }
}

/// Memory remote whose first media select reads its rows, then waits for
/// `release` before returning them
#[derive(Clone)]
pub struct StalledPull {
    pub inner: MemoryRemote,
    pub entered: Arc<Semaphore>,
    pub release: Arc<Semaphore>,
    armed: Arc<AtomicBool>,
}

impl StalledPull {
    pub fn new(inner: MemoryRemote) -> Self {
        Self {
            inner,
            entered: Arc::new(Semaphore::new(0)),
            release: Arc::new(Semaphore::new(0)),
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub async fn wait_until_stalled(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    pub fn resume(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait]
impl RemoteStore for StalledPull {
    fn name(&self) -> &str {
        "stalled-pull"
    }

    async fn insert(&self, table: RemoteTable, row: Value) -> Result<Value, RemoteError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: RemoteTable, id: &str, fields: Value) -> Result<(), RemoteError> {
        self.inner.update(table, id, fields).await
    }

    async fn delete(&self, table: RemoteTable, id: &str) -> Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError> {
        let rows = self.inner.select(table, order).await?;
        if table == RemoteTable::Media && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.add_permits(1);
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.inner.ping().await
    }
}
