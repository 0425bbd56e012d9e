//! # store::kv
//!
//! Session-local key/value persistence.  The core only sees the
//! [`KeyValueStore`] trait; values are JSON strings.
//!
//! | Key              | Value                                   |
//! |------------------|-----------------------------------------|
//! | `alert_config`   | [`AlertConfig`](crate::config::AlertConfig) |
//! | `in_app_alerts`  | `Vec<Alert>`, most recent first         |
//! | `delivery_log`   | `Vec<DeliveryLogEntry>`, newest first   |
//!
//! Cooldowns are deliberately absent: a restart may re-fire an alert.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::StoreError;

pub mod keys {
    pub const CONFIG:       &str = "alert_config";
    pub const ALERTS:       &str = "in_app_alerts";
    pub const DELIVERY_LOG: &str = "delivery_log";
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode a JSON value.  A corrupt value is logged and treated as
/// missing so a bad file never blocks startup.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, error = %e, "Persisted value is corrupt, ignoring");
            Ok(None)
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set(key, serde_json::to_string(value)?)
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

/// Non-durable store for tests and `STATE_FILE=memory`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.map.write().remove(key);
        Ok(())
    }
}

// ─── FileStore ────────────────────────────────────────────────────────────────

/// All keys live in one JSON object on disk; every write rewrites the file
/// through a temporary sibling and a rename.
#[derive(Debug)]
pub struct FileStore {
    path:  PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens (or lazily creates) the state file.  A missing file starts
    /// empty; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let cache = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "State file is corrupt, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value);
        self.flush(&cache)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_some() {
            self.flush(&cache)?;
        }
        Ok(())
    }
}
