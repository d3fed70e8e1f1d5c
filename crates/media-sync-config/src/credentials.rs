use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

/// Secrets kept out of `config.toml` (remote api key, session token)
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    // Remote store credentials
    pub fn get_remote_api_key(&self) -> Option<&String> {
        self.get("remote_api_key")
    }

    pub fn set_remote_api_key(&mut self, key: String) {
        self.set("remote_api_key".to_string(), key);
    }

    /// Session token for a signed-in user; falls back to the api key when absent
    pub fn get_remote_access_token(&self) -> Option<&String> {
        self.get("remote_access_token")
    }

    pub fn set_remote_access_token(&mut self, token: String) {
        self.set("remote_access_token".to_string(), token);
    }

    pub fn get_remote_token_expires(&self) -> Option<DateTime<Utc>> {
        self.get("remote_token_expires")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_remote_token_expires(&mut self, expires: DateTime<Utc>) {
        self.set("remote_token_expires".to_string(), expires.to_rfc3339());
    }

    /// Access token only if it has not expired yet
    pub fn valid_access_token(&self) -> Option<&String> {
        let token = self.get_remote_access_token()?;
        match self.get_remote_token_expires() {
            Some(expires) if expires <= Utc::now() => None,
            _ => Some(token),
        }
    }

    /// Drop the session (logout); the api key stays
    pub fn clear_session(&mut self) {
        self.remove("remote_access_token");
        self.remove("remote_token_expires");
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_store_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        store.set_remote_api_key("anon-key".to_string());
        store.set_remote_access_token("session-token".to_string());
        store.save().unwrap();

        let mut loaded_store = CredentialStore::new(path);
        loaded_store.load().unwrap();
        assert_eq!(loaded_store.get_remote_api_key(), Some(&"anon-key".to_string()));
        assert_eq!(loaded_store.get_remote_access_token(), Some(&"session-token".to_string()));
    }

    #[test]
    fn test_expired_access_token_is_not_valid() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/unused"));
        store.set_remote_access_token("session-token".to_string());
        assert!(store.valid_access_token().is_some());

        store.set_remote_token_expires(Utc::now() - chrono::Duration::minutes(5));
        assert!(store.valid_access_token().is_none());

        store.set_remote_token_expires(Utc::now() + chrono::Duration::hours(1));
        assert_eq!(store.valid_access_token(), Some(&"session-token".to_string()));
    }

    #[test]
    fn test_clear_session_keeps_api_key() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/unused"));
        store.set_remote_api_key("anon-key".to_string());
        store.set_remote_access_token("session-token".to_string());
        store.clear_session();

        assert_eq!(store.get_remote_access_token(), None);
        assert_eq!(store.get_remote_api_key(), Some(&"anon-key".to_string()));
        assert_eq!(store.get_all_keys(), vec!["remote_api_key".to_string()]);
    }
}
