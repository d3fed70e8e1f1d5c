use media_sync_remote::RemoteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Online/offline flag with a transition stream.
///
/// Reads are synchronous. Clones share the flag.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns true when this call changed the state
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(operation = "connectivity", online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Ping the remote once and record the result
pub async fn probe_once(connectivity: &Connectivity, remote: &dyn RemoteStore, timeout: Duration) -> bool {
    let online = match tokio::time::timeout(timeout, remote.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(remote = remote.name(), error = %e, "Remote ping failed");
            false
        }
        Err(_) => {
            debug!(remote = remote.name(), "Remote ping timed out");
            false
        }
    };
    connectivity.set_online(online);
    online
}

/// Probe the remote every `interval` until the handle is aborted
pub fn spawn_probe(connectivity: Connectivity, remote: Arc<dyn RemoteStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            probe_once(&connectivity, remote.as_ref(), interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_remote::MemoryRemote;

    #[test]
    fn test_set_online_reports_transitions() {
        let connectivity = Connectivity::offline();
        let rx = connectivity.subscribe();
        assert!(!connectivity.is_online());
        assert!(connectivity.set_online(true));
        assert!(!connectivity.set_online(true));
        assert!(*rx.borrow());
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_probe_follows_remote_reachability() {
        let remote = MemoryRemote::new();
        let connectivity = Connectivity::offline();

        assert!(probe_once(&connectivity, &remote, Duration::from_secs(1)).await);
        assert!(connectivity.is_online());

        remote.set_reachable(false);
        assert!(!probe_once(&connectivity, &remote, Duration::from_secs(1)).await);
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn test_spawned_probe_publishes_transition() {
        let remote = MemoryRemote::new();
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();

        let probe = spawn_probe(connectivity.clone(), Arc::new(remote), Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(connectivity.is_online());
        probe.abort();
    }
}
