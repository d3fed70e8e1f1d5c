pub mod clear;
pub mod collections;
pub mod config;
pub mod daemon;
pub mod library;
pub mod prompts;
pub mod queue;
pub mod status;
pub mod sync;
pub mod sync_ui;
pub mod transfer;

use crate::output::Output;
use color_eyre::Result;
use media_sync_config::{Config, CredentialStore, PathManager};
use media_sync_core::{probe_once, Connectivity, CoordinatorOptions, LocalStore, SyncCoordinator};
use media_sync_remote::RemoteFactory;
use std::time::Duration;
use tracing::debug;

/// Everything a command needs: paths, configuration and the coordinator
pub struct AppContext {
    pub paths: PathManager,
    pub config: Config,
    pub coordinator: SyncCoordinator,
}

pub fn load_paths() -> Result<PathManager> {
    let paths = PathManager::new().map_err(|e| color_eyre::eyre::eyre!("Could not determine config directory: {}", e))?;
    paths
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories under {}: {}", paths.config_dir().display(), e))?;
    Ok(paths)
}

pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

pub fn load_credentials(paths: &PathManager) -> Result<CredentialStore> {
    let credentials_file = paths.credentials_file();
    let mut credentials = CredentialStore::new(credentials_file.clone());
    credentials
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    Ok(credentials)
}

impl AppContext {
    /// Open the local store and build the coordinator. When a remote is
    /// configured it is probed once so the first write knows whether to
    /// send or queue.
    pub async fn open(output: &Output) -> Result<Self> {
        let paths = load_paths()?;
        let config = load_config(&paths)?;
        let credentials = load_credentials(&paths)?;

        let remote = RemoteFactory::from_config(&config, &credentials)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to set up remote store: {}", e))?;

        let database_file = paths.database_file();
        let store = LocalStore::open(&database_file)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to open local store at {}: {}", database_file.display(), e))?;

        let connectivity = Connectivity::offline();
        if config.is_remote_configured() {
            let timeout = Duration::from_secs(config.remote.timeout_seconds.max(1));
            if !probe_once(&connectivity, remote.as_ref(), timeout).await {
                output.warn(format!("Remote store ({}) is unreachable, working offline", remote.name()));
            }
        }
        debug!(
            remote = remote.name(),
            online = connectivity.is_online(),
            database = %database_file.display(),
            "Opened library"
        );

        let coordinator = SyncCoordinator::new(store, remote, connectivity, CoordinatorOptions::from_config(&config))
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load library: {}", e))?;

        Ok(Self {
            paths,
            config,
            coordinator,
        })
    }

    /// Wait for background remote writes before the process exits
    pub async fn finish(&self) {
        self.coordinator.settle().await;
    }
}
