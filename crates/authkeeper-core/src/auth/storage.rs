use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

/// Application name used for the data directory path
const APP_NAME: &str = "authkeeper";

/// Token file name in the data directory
const TOKEN_FILE: &str = "tokens.json";

/// Default storage key for the access token
pub const DEFAULT_ACCESS_TOKEN_KEY: &str = "jwt_access_token";

/// Default storage key for the refresh token
pub const DEFAULT_REFRESH_TOKEN_KEY: &str = "jwt_refresh_token";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Persistent string key-value medium the token store writes through.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Holds the access and refresh tokens under two independent keys.
///
/// Clone is cheap and clones share the same medium.
#[derive(Clone)]
pub struct TokenStore {
    medium: Arc<dyn KeyValueStore>,
    access_key: String,
    refresh_key: String,
}

impl TokenStore {
    pub fn new(
        medium: Arc<dyn KeyValueStore>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            medium,
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
        }
    }

    /// In-memory store with the default keys
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            DEFAULT_ACCESS_TOKEN_KEY,
            DEFAULT_REFRESH_TOKEN_KEY,
        )
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(&self.access_key)
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.medium.set(&self.access_key, token)
    }

    pub fn remove_access_token(&self) -> Result<(), StorageError> {
        self.medium.remove(&self.access_key)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(&self.refresh_key)
    }

    /// Persist a refresh token. Empty tokens are ignored.
    pub fn set_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        if token.is_empty() {
            return Ok(());
        }
        self.medium.set(&self.refresh_key, token)
    }

    pub fn remove_refresh_token(&self) -> Result<(), StorageError> {
        self.medium.remove(&self.refresh_key)
    }

    /// Remove both tokens
    pub fn clear(&self) -> Result<(), StorageError> {
        self.remove_access_token()?;
        self.remove_refresh_token()
    }

    /// Read failures and empty values both count as "no token".
    fn read(&self, key: &str) -> Option<String> {
        match self.medium.get(key) {
            Ok(Some(value)) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read token from storage");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("access_key", &self.access_key)
            .field("refresh_key", &self.refresh_key)
            .finish_non_exhaustive()
    }
}

/// Process-local medium. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Medium for contexts with no persistent location: reads find nothing,
/// writes are accepted and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl KeyValueStore for NullStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// JSON map persisted to a single file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/authkeeper/tokens.json`, if the platform has one
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_NAME).join(TOKEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Token file written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}
