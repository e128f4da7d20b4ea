//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the auth base path, token storage keys and backend, and the
//! request and refresh timeouts.
//!
//! Configuration is stored at `~/.config/authkeeper/config.json`, and each
//! field may be overridden with an `AUTHKEEPER_*` environment variable.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::endpoints::DEFAULT_AUTH_BASE_PATH;
use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::storage::{DEFAULT_ACCESS_TOKEN_KEY, DEFAULT_REFRESH_TOKEN_KEY};
use crate::auth::{FileStore, KeyValueStore, KeyringStore, MemoryStore, NullStore, TokenStore};

/// Application name used for config directory paths
const APP_NAME: &str = "authkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default bound on a refresh call, in seconds
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;

/// Which medium persists the token pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Keyring,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Client kind reported to the auth API in login payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Web,
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_base_url: String,
    pub api_base_path: String,
    pub token_storage_key: String,
    pub refresh_token_storage_key: String,
    pub default_client: ClientKind,
    pub storage: StorageBackend,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_base_path: DEFAULT_AUTH_BASE_PATH.to_string(),
            token_storage_key: DEFAULT_ACCESS_TOKEN_KEY.to_string(),
            refresh_token_storage_key: DEFAULT_REFRESH_TOKEN_KEY.to_string(),
            default_client: ClientKind::Web,
            storage: StorageBackend::File,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
        }
    }
}

impl AuthConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from `AUTHKEEPER_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("AUTHKEEPER_API_BASE_URL") {
            self.api_base_url = value.trim().to_string();
        }
        if let Some(value) = get("AUTHKEEPER_AUTH_BASE_PATH") {
            self.api_base_path = value;
        }
        if let Some(value) = get("AUTHKEEPER_TOKEN_STORAGE_KEY") {
            self.token_storage_key = value;
        }
        if let Some(value) = get("AUTHKEEPER_REFRESH_TOKEN_STORAGE_KEY") {
            self.refresh_token_storage_key = value;
        }
        if let Some(value) = get("AUTHKEEPER_STORAGE") {
            match value.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring AUTHKEEPER_STORAGE"),
            }
        }
        if let Some(value) = get("AUTHKEEPER_REQUEST_TIMEOUT_SECS") {
            match value.trim().parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid AUTHKEEPER_REQUEST_TIMEOUT_SECS"),
            }
        }
        if let Some(value) = get("AUTHKEEPER_REFRESH_TIMEOUT_SECS") {
            match value.trim().parse() {
                Ok(secs) => self.refresh_timeout_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid AUTHKEEPER_REFRESH_TIMEOUT_SECS"),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Build the token store for the configured backend.
    ///
    /// Falls back to a no-op medium when the file backend has no data directory.
    pub fn open_token_store(&self) -> TokenStore {
        let medium: Arc<dyn KeyValueStore> = match self.storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Keyring => Arc::new(KeyringStore::default()),
            StorageBackend::File => match FileStore::default_location() {
                Some(path) => Arc::new(FileStore::new(path)),
                None => {
                    warn!("No data directory available, tokens will not be persisted");
                    Arc::new(NullStore)
                }
            },
        };
        TokenStore::new(
            medium,
            self.token_storage_key.clone(),
            self.refresh_token_storage_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.api_base_path, "/authentication");
        assert_eq!(config.token_storage_key, "jwt_access_token");
        assert_eq!(config.refresh_token_storage_key, "jwt_refresh_token");
        assert_eq!(config.refresh_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_client, ClientKind::Web);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AuthConfig =
            serde_json::from_str(r#"{"api_base_url": "https://api.example.com", "storage": "memory"}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.token_storage_key, "jwt_access_token");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AUTHKEEPER_API_BASE_URL", " https://qa.example.com "),
            ("AUTHKEEPER_STORAGE", "keyring"),
            ("AUTHKEEPER_REFRESH_TIMEOUT_SECS", "5"),
            ("AUTHKEEPER_REQUEST_TIMEOUT_SECS", "soon"),
            ("AUTHKEEPER_AUTH_BASE_PATH", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AuthConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_base_url, "https://qa.example.com");
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.refresh_timeout_secs, 5);
        // Invalid and blank values leave the existing setting alone
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.api_base_path, "/authentication");
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("File".parse::<StorageBackend>(), Ok(StorageBackend::File));
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_memory_backend_token_store() {
        let mut config = AuthConfig::default();
        config.storage = StorageBackend::Memory;
        let store = config.open_token_store();
        store.set_access_token("at").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("at"));
    }
}
