use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Shared backend the library is mirrored into (Supabase/PostgREST)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    /// Per-call timeout; a hung request turns into a queued retry
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Permanent rejections tolerated before an entry is dead-lettered
    #[serde(default = "default_max_rejections")]
    pub max_rejections: u32,
    #[serde(default = "default_history_pull_limit")]
    pub history_pull_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_probe_interval_seconds")]
    pub probe_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_max_rejections() -> u32 {
    5
}

fn default_history_pull_limit() -> usize {
    50
}

fn default_probe_interval_seconds() -> u64 {
    15
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_rejections: default_max_rejections(),
            history_pull_limit: default_history_pull_limit(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            probe_interval_seconds: default_probe_interval_seconds(),
            run_on_startup: default_true(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path`, or the defaults when it does not exist yet
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.remote.enabled {
            let url = self.remote.url.trim();
            if url.is_empty() || url == "YOUR_PROJECT_URL" {
                return Err(anyhow::anyhow!("remote is enabled but url is not configured"));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("remote url must start with http:// or https://: {}", url));
            }
        }
        if self.remote.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("remote.timeout_seconds must be greater than zero"));
        }
        if self.sync.interval_seconds == 0 {
            return Err(anyhow::anyhow!("sync.interval_seconds must be greater than zero"));
        }
        if self.sync.max_rejections == 0 {
            return Err(anyhow::anyhow!("sync.max_rejections must be at least 1"));
        }
        if self.daemon.probe_interval_seconds == 0 {
            return Err(anyhow::anyhow!("daemon.probe_interval_seconds must be greater than zero"));
        }
        Ok(())
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.enabled
            && !self.remote.url.trim().is_empty()
            && self.remote.url != "YOUR_PROJECT_URL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let config = Config {
            remote: RemoteConfig {
                enabled: true,
                url: "https://abc.supabase.co".to_string(),
                timeout_seconds: 4,
            },
            sync: SyncOptions {
                interval_seconds: 60,
                ..SyncOptions::default()
            },
            daemon: DaemonConfig::default(),
        };

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.remote.url, "https://abc.supabase.co");
        assert_eq!(loaded.remote.timeout_seconds, 4);
        assert_eq!(loaded.sync.interval_seconds, 60);
        assert_eq!(loaded.sync.max_rejections, 5);
        assert!(loaded.daemon.run_on_startup);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[remote]\nenabled = false\n").unwrap();
        assert_eq!(config.remote.timeout_seconds, 10);
        assert_eq!(config.sync.interval_seconds, 30);
        assert_eq!(config.sync.history_pull_limit, 50);
        assert_eq!(config.daemon.probe_interval_seconds, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        config.remote.enabled = true;
        config.remote.url = "YOUR_PROJECT_URL".to_string();
        assert!(config.validate().is_err());
        assert!(!config.is_remote_configured());

        config.remote.url = "abc.supabase.co".to_string();
        assert!(config.validate().is_err());

        config.remote.url = "https://abc.supabase.co".to_string();
        assert!(config.validate().is_ok());
        assert!(config.is_remote_configured());

        config.sync.max_rejections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert!(!config.remote.enabled);
    }
}
