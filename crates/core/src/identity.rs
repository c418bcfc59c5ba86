//! Stable per-browser visitor identifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::KeyValueStore;

/// Opaque id generated once and persisted; the bucketing key for every experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableUserId(String);

impl StableUserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the persisted id, creating and persisting one if absent.
    ///
    /// A store that cannot be read or written still yields an id; it just
    /// won't survive the session.
    pub fn load_or_create(store: &dyn KeyValueStore, key: &str) -> Self {
        if let Ok(Some(existing)) = store.get(key) {
            if !existing.trim().is_empty() {
                return Self(existing);
            }
        }
        let id = Self::generate();
        if let Err(e) = store.set(key, &id.0) {
            warn!(error = %e, "could not persist stable user id");
        }
        debug!(user_id = %id, "generated stable user id");
        id
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
