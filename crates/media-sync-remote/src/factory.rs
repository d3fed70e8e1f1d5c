//! Builds the remote store from configuration.

use anyhow::Result;
use media_sync_config::{Config, CredentialStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::disconnected::DisconnectedRemote;
use crate::postgrest::PostgrestRemote;
use crate::traits::RemoteStore;

pub struct RemoteFactory;

impl RemoteFactory {
    /// The configured PostgREST backend, or a disconnected stand-in when the
    /// remote is disabled. Enabled without an api key is a configuration error.
    pub fn from_config(config: &Config, credentials: &CredentialStore) -> Result<Arc<dyn RemoteStore>> {
        if !config.is_remote_configured() {
            info!(operation = "remote_factory", "No remote store configured, changes stay local and queued");
            return Ok(Arc::new(DisconnectedRemote::new()));
        }

        let api_key = credentials.get_remote_api_key().ok_or_else(|| {
            anyhow::anyhow!("remote is enabled but no remote_api_key is stored, run `mediashelf config remote`")
        })?;

        let timeout = Duration::from_secs(config.remote.timeout_seconds);
        let mut remote = PostgrestRemote::new(config.remote.url.trim(), api_key.clone(), timeout);

        if let Some(token) = credentials.valid_access_token() {
            remote = remote.with_access_token(token.clone());
        } else if credentials.get_remote_access_token().is_some() {
            warn!(operation = "remote_factory", "Stored access token has expired, falling back to the api key");
        }

        info!(operation = "remote_factory", url = %remote.base_url(), "Using PostgREST remote store");
        Ok(Arc::new(remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.toml"));
        (dir, store)
    }

    #[test]
    fn test_disabled_remote_is_disconnected() {
        let (_dir, creds) = credentials();
        let remote = RemoteFactory::from_config(&Config::default(), &creds).unwrap();
        assert_eq!(remote.name(), "disconnected");
    }

    #[test]
    fn test_enabled_remote_requires_api_key() {
        let (_dir, mut creds) = credentials();
        let mut config = Config::default();
        config.remote.enabled = true;
        config.remote.url = "https://abc.supabase.co".to_string();

        assert!(RemoteFactory::from_config(&config, &creds).is_err());

        creds.set_remote_api_key("anon-key".to_string());
        let remote = RemoteFactory::from_config(&config, &creds).unwrap();
        assert_eq!(remote.name(), "postgrest");
    }
}
