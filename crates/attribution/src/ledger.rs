//! Touchpoint ledger: append-only, time-ordered, bounded by count and by a
//! rolling window. Touchpoints and conversion history persist together as a
//! single blob.

use chrono::{DateTime, Duration, Utc};
use insights_core::config::AttributionConfig;
use insights_core::storage::{load_json, save_json, KeyValueStore};
use insights_core::types::{Conversion, Touchpoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    pub window: Duration,
    pub max_touchpoints: usize,
    pub max_conversions: usize,
}

impl LedgerPolicy {
    pub fn from_config(config: &AttributionConfig) -> Self {
        Self {
            window: Duration::days(config.window_days as i64),
            max_touchpoints: config.max_touchpoints.max(1),
            max_conversions: config.max_conversions.max(1),
        }
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self::from_config(&AttributionConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredLedger {
    #[serde(default)]
    touchpoints: Vec<Touchpoint>,
    #[serde(default)]
    conversions: Vec<Conversion>,
}

#[derive(Debug, Clone)]
pub struct TouchpointLedger {
    touchpoints: Vec<Touchpoint>,
    conversions: Vec<Conversion>,
    policy: LedgerPolicy,
}

impl TouchpointLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self {
            touchpoints: Vec::new(),
            conversions: Vec::new(),
            policy,
        }
    }

    /// Load from storage, filtered to the window. The flag reports whether
    /// any ledger had ever been stored for this visitor.
    pub fn load(
        store: &dyn KeyValueStore,
        key: &str,
        policy: LedgerPolicy,
        now: DateTime<Utc>,
    ) -> (Self, bool) {
        let existed = matches!(store.get(key), Ok(Some(_)));
        let stored: StoredLedger = load_json(store, key).unwrap_or_default();

        let mut ledger = Self {
            touchpoints: stored.touchpoints,
            conversions: stored.conversions,
            policy,
        };
        ledger.touchpoints.sort_by_key(|t| t.timestamp);
        ledger.enforce_bounds();
        let pruned = ledger.prune(now);
        debug!(
            touchpoints = ledger.touchpoints.len(),
            conversions = ledger.conversions.len(),
            pruned,
            "attribution ledger loaded"
        );
        (ledger, existed)
    }

    pub fn persist(&self, store: &dyn KeyValueStore, key: &str) {
        save_json(
            store,
            key,
            &StoredLedger {
                touchpoints: self.touchpoints.clone(),
                conversions: self.conversions.clone(),
            },
        );
    }

    /// Insert in timestamp order, dropping the oldest entries past the cap.
    pub fn append(&mut self, touchpoint: Touchpoint) {
        let at = self
            .touchpoints
            .partition_point(|t| t.timestamp <= touchpoint.timestamp);
        self.touchpoints.insert(at, touchpoint);
        self.enforce_bounds();
    }

    pub fn push_conversion(&mut self, conversion: Conversion) {
        self.conversions.push(conversion);
        self.enforce_bounds();
    }

    /// Remove touchpoints older than the window. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.policy.window;
        let before = self.touchpoints.len();
        self.touchpoints.retain(|t| t.timestamp >= cutoff);
        before - self.touchpoints.len()
    }

    fn enforce_bounds(&mut self) {
        if self.touchpoints.len() > self.policy.max_touchpoints {
            let excess = self.touchpoints.len() - self.policy.max_touchpoints;
            self.touchpoints.drain(..excess);
        }
        if self.conversions.len() > self.policy.max_conversions {
            let excess = self.conversions.len() - self.policy.max_conversions;
            self.conversions.drain(..excess);
        }
    }

    pub fn touchpoints(&self) -> &[Touchpoint] {
        &self.touchpoints
    }

    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    pub fn is_empty(&self) -> bool {
        self.touchpoints.is_empty()
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }
}
