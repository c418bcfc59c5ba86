//! Client-side key-value storage behind a small `get/set/remove` trait.
//!
//! [`MemoryStore`] backs tests and in-process hosts; [`JsonFileStore`] keeps
//! the whole map in one JSON file, rewritten on every mutation. Readers treat
//! the store as eventually consistent: missing or corrupt values are empty
//! state, never an error surfaced to the page.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{InsightsError, InsightsResult};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> InsightsResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> InsightsResult<()>;
    fn remove(&self, key: &str) -> InsightsResult<()>;
}

/// Logical storage keys, namespaced by a configurable prefix.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    pub stable_user_id: String,
    pub experiment_assignments: String,
    pub attribution: String,
}

impl StorageKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            stable_user_id: format!("{prefix}.stable_user_id"),
            experiment_assignments: format!("{prefix}.experiment_assignments"),
            attribution: format!("{prefix}.attribution"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::with_prefix("site_insights")
    }
}

/// Read and decode a JSON value. Unavailable storage and undecodable blobs
/// both come back as `None` with a warning.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "storage read failed, treating as empty");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "stored value is corrupt, treating as empty");
            None
        }
    }
}

/// Encode and write a JSON value. Failures are logged and swallowed.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(InsightsError::from)
        .and_then(|raw| store.set(key, &raw));
    if let Err(e) = result {
        warn!(key, error = %e, "storage write failed");
    }
}

/// Lock-free in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> InsightsResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> InsightsResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> InsightsResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Durable store persisting the whole key space as one JSON object.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, starting empty if the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "storage file is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "storage file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), keys = entries.len(), "opened json file store");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> InsightsResult<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> InsightsResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> InsightsResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> InsightsResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
