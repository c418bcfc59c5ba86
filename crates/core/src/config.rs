use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Root configuration. Loaded from environment variables with the prefix
/// `SITE_INSIGHTS__` and an optional TOML/JSON config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Prefix applied to every persisted key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Backing file for [`crate::storage::JsonFileStore`]. In-memory when unset.
    #[serde(default)]
    pub file_path: Option<String>,
}

/// How the traffic-allocation gate draws its number.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Draw derived from a salted hash of the user id, stable across sessions.
    #[default]
    Sticky,
    /// Fresh uniform random draw on every assignment attempt.
    PerAttempt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentsConfig {
    #[serde(default)]
    pub allocation_mode: AllocationMode,
    /// JSON file holding the experiment definitions.
    #[serde(default)]
    pub definitions_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_max_touchpoints")]
    pub max_touchpoints: usize,
    #[serde(default = "default_max_conversions")]
    pub max_conversions: usize,
    #[serde(default = "default_decay_days")]
    pub decay_days: f64,
    /// Host of the site itself; referrers from it are internal navigation.
    #[serde(default = "default_site_host")]
    pub site_host: String,
    /// Default value per conversion type when the caller supplies none.
    #[serde(default = "default_conversion_values")]
    pub conversion_values: HashMap<String, f64>,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub measurement_id: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub debug_mode: bool,
}

fn default_key_prefix() -> String {
    "site_insights".to_string()
}
fn default_window_days() -> u32 {
    30
}
fn default_max_touchpoints() -> usize {
    50
}
fn default_max_conversions() -> usize {
    20
}
fn default_decay_days() -> f64 {
    7.0
}
fn default_site_host() -> String {
    "localhost".to_string()
}
fn default_conversion_values() -> HashMap<String, f64> {
    HashMap::from([
        ("quote_request".to_string(), 150.0),
        ("phone_call".to_string(), 120.0),
        ("contact_form".to_string(), 100.0),
    ])
}
fn default_cleanup_interval_secs() -> u64 {
    300
}
fn default_buffer_capacity() -> usize {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            file_path: None,
        }
    }
}

impl Default for ExperimentsConfig {
    fn default() -> Self {
        Self {
            allocation_mode: AllocationMode::default(),
            definitions_path: None,
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_touchpoints: default_max_touchpoints(),
            max_conversions: default_max_conversions(),
            decay_days: default_decay_days(),
            site_host: default_site_host(),
            conversion_values: default_conversion_values(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            measurement_id: String::new(),
            api_secret: String::new(),
            buffer_capacity: default_buffer_capacity(),
            debug_mode: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            experiments: ExperimentsConfig::default(),
            attribution: AttributionConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl AttributionConfig {
    pub fn default_value_for(&self, conversion_type: &str) -> f64 {
        self.conversion_values
            .get(conversion_type)
            .copied()
            .unwrap_or(1.0)
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder().build()?.try_deserialize()
    }

    /// Load configuration from a file, with environment variables layered on top.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(Self::env_source());
        builder.build()?.try_deserialize()
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(Self::env_source())
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix("SITE_INSIGHTS")
            .separator("__")
            .try_parsing(true)
    }
}
