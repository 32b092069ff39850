//! Persisted client state
//!
//! The client remembers which connector was last active so that it can
//! reconnect silently on the next start. The value lives under a single key
//! of a small string key-value store that outlives the process.
//!
//! # Storage Format
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "entries": {
//!     "wallet_id": {
//!       "value": "walletConnect",
//!       "updated_at": "2024-01-01T00:00:00Z"
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StorageSettings;
use crate::error::{Error, Result};

/// Key holding the last active connector id or discovery provider name
pub const WALLET_CHOICE_KEY: &str = "wallet_id";

/// File name of the persisted store inside the storage directory
pub const STATE_FILE_NAME: &str = "state.json";

/// String key-value store that survives restarts
pub trait PersistentStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// On-disk format of the file store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFile {
    /// Format version
    pub version: String,
    /// Stored entries
    pub entries: HashMap<String, StoreEntry>,
}

/// One stored value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Stored value
    pub value: String,
    /// Last write timestamp
    pub updated_at: DateTime<Utc>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            entries: HashMap::new(),
        }
    }
}

/// JSON file backed store
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store inside the configured storage directory
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        fs::create_dir_all(&settings.path).map_err(|e| {
            Error::storage(format!("Failed to create storage directory: {}", e))
        })?;

        Ok(Self::at_path(settings.path.join(STATE_FILE_NAME)))
    }

    /// Use an explicit file path; the parent directory must exist
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<StoreFile> {
        let json_data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::default())
            }
            Err(e) => {
                return Err(Error::storage(format!("Failed to read state file: {}", e)))
            }
        };

        serde_json::from_str(&json_data)
            .map_err(|e| Error::serialization(format!("Failed to parse state file: {}", e)))
    }

    fn write_file(&self, file: &StoreFile) -> Result<()> {
        let json_data = serde_json::to_string_pretty(file)
            .map_err(|e| Error::serialization(format!("Failed to serialize state: {}", e)))?;

        // Write to file atomically
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json_data)
            .map_err(|e| Error::storage(format!("Failed to write state file: {}", e)))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::storage(format!("Failed to rename state file: {}", e)))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::storage("State file lock poisoned"))
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_file()?.entries.remove(key).map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut file = self.read_file()?;
        file.entries.insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
        self.write_file(&file)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut file = self.read_file()?;
        if file.entries.remove(key).is_some() {
            self.write_file(&file)?;
        }
        Ok(())
    }
}

/// Process-local store, for tests and hosts without a disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding one value
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        store
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("Memory store lock poisoned"))
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
