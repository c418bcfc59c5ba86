use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Experimentation ────────────────────────────────────────────────────

/// A/B/n experiment definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub variants: Vec<Variant>,
    pub status: ExperimentStatus,
    #[serde(default = "default_traffic_allocation")]
    pub traffic_allocation_percent: f64,
    pub target_metric: String,
    #[serde(default)]
    pub minimum_sample_size: u64,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    #[serde(default)]
    pub segments: Vec<String>,
}

fn default_traffic_allocation() -> f64 {
    100.0
}

fn default_confidence_level() -> f64 {
    95.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub weight_percent: f64,
    /// Opaque presentation settings. Keys are documented per experiment.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Experiment {
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn control(&self) -> Option<&Variant> {
        self.variants.first()
    }
}

/// Sticky bucket for one (user, experiment) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAssignment {
    pub experiment_id: String,
    pub variant_id: String,
}

/// Per-variant counters accumulated outside the session, fed to significance testing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantCounters {
    pub visitors: u64,
    pub conversions: u64,
}

impl VariantCounters {
    pub fn new(visitors: u64, conversions: u64) -> Self {
        Self {
            visitors,
            conversions,
        }
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.visitors == 0 {
            0.0
        } else {
            self.conversions as f64 / self.visitors as f64
        }
    }
}

// ─── Attribution ────────────────────────────────────────────────────────

/// A single marketing-channel visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Touchpoint {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub medium: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub page: String,
    pub value: f64,
}

impl Touchpoint {
    /// Channel key used by every attribution map, `"source:medium"`.
    pub fn channel(&self) -> String {
        channel_key(&self.source, &self.medium)
    }
}

pub fn channel_key(source: &str, medium: &str) -> String {
    format!("{source}:{medium}")
}

/// Channel key to percentage of credit.
pub type ChannelWeights = BTreeMap<String, f64>;

/// The four attribution distributions over the current ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttributionWeights {
    pub first_touch: ChannelWeights,
    pub last_touch: ChannelWeights,
    pub linear: ChannelWeights,
    pub time_decay: ChannelWeights,
}

impl AttributionWeights {
    pub fn is_empty(&self) -> bool {
        self.first_touch.is_empty()
    }
}

/// A lead or sale, with the attribution snapshot taken when it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversion {
    pub conversion_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub attribution: AttributionWeights,
}
