use super::{load_config, load_paths, AppContext};
use crate::logging::init_file_logging;
use crate::output::Output;
use color_eyre::Result;
use media_sync_core::{spawn_probe, SyncCoordinator};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Periodic reconciler: runs a fetch on every tick and whenever the remote
/// comes back after being unreachable
pub struct Scheduler {
    coordinator: SyncCoordinator,
    interval: Duration,
    probe_interval: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(coordinator: SyncCoordinator, interval: Duration, probe_interval: Duration, run_on_startup: bool) -> Self {
        Self {
            coordinator,
            interval,
            probe_interval,
            run_on_startup,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let probe = spawn_probe(
            self.coordinator.connectivity().clone(),
            self.coordinator.remote().clone(),
            self.probe_interval,
        );
        let mut connectivity = self.coordinator.connectivity().subscribe();

        if self.run_on_startup {
            info!(operation = "scheduler_startup", "Running initial sync on startup");
            self.run_sync("startup").await;
        }

        info!(
            operation = "scheduler_started",
            interval_secs = self.interval.as_secs(),
            probe_interval_secs = self.probe_interval.as_secs(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_sync("scheduled").await;
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        warn!(operation = "scheduler_connectivity", "Connectivity channel closed");
                        break;
                    }
                    let online = *connectivity.borrow_and_update();
                    info!(operation = "connectivity_change", online, "Remote connectivity changed");
                    if online {
                        self.run_sync("reconnected").await;
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!(operation = "scheduler_signal", error = %e, "Failed to listen for shutdown signal");
                    }
                    info!(operation = "scheduler_shutdown", "Shutdown requested");
                    break;
                }
            }
        }

        probe.abort();
        self.coordinator.settle().await;
        info!(
            operation = "scheduler_stopped",
            pending = self.coordinator.status().pending_changes,
            "Scheduler stopped"
        );
        Ok(())
    }

    async fn run_sync(&self, trigger: &'static str) {
        info!(operation = "scheduled_sync_start", trigger, "Starting sync");
        match self.coordinator.fetch().await {
            Ok(reconciled) => {
                let report = reconciled.report;
                match &report.remote_error {
                    Some(remote_error) => warn!(
                        operation = "scheduled_sync_degraded",
                        trigger,
                        error = %remote_error,
                        still_pending = report.still_pending,
                        "Remote store unavailable, kept local library"
                    ),
                    None => info!(
                        operation = "scheduled_sync_complete",
                        trigger,
                        drained = report.drained,
                        pulled = report.pulled,
                        still_pending = report.still_pending,
                        dead_lettered = report.dead_lettered,
                        duration_ms = report.duration.as_millis() as u64,
                        "Sync completed"
                    ),
                }
            }
            Err(e) => {
                error!(operation = "scheduled_sync_error", trigger, error = %e, "Sync failed");
            }
        }
    }
}

pub async fn run_daemon(interval: Option<u64>, no_startup_sync: bool, verbose: u8, output: &Output) -> Result<()> {
    let paths = load_paths()?;
    let config = load_config(&paths)?;
    if !config.is_remote_configured() {
        return Err(color_eyre::eyre::eyre!(
            "No remote store configured. Run 'mediashelf config remote --url <URL>' first."
        ));
    }

    let log_file = paths.daemon_log_file();
    let _guard = init_file_logging(verbose, &log_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to set up logging at {}: {}", log_file.display(), e))?;
    output.info(format!("Daemon started. Logs are written to {}", log_file.display()));

    let ctx = AppContext::open(output).await?;
    let interval = Duration::from_secs(interval.unwrap_or(ctx.config.sync.interval_seconds).max(1));
    let probe_interval = Duration::from_secs(ctx.config.daemon.probe_interval_seconds.max(1));
    let run_on_startup = ctx.config.daemon.run_on_startup && !no_startup_sync;

    let scheduler = Scheduler::new(ctx.coordinator.clone(), interval, probe_interval, run_on_startup);
    scheduler
        .start()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Scheduler failed: {}", e))?;
    output.info("Daemon stopped");
    Ok(())
}
