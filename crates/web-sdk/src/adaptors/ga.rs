//! Google Analytics 4 (GA4) Measurement Protocol adaptor: transforms
//! experiment and attribution events into GA4 event payloads.

use anyhow::{anyhow, Result};
use insights_core::config::AnalyticsConfig;
use insights_core::event_bus::{AnalyticsEvent, PropertyValue};
use insights_core::hashing::stable_hash;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AnalyticsAdaptor;

/// GA4 caps parameter names at 40 characters.
const MAX_PARAM_NAME_LEN: usize = 40;

/// Configuration for the GA4 adaptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaConfig {
    /// GA4 Measurement ID, e.g. "G-XXXXXXXXXX".
    pub measurement_id: String,
    /// API secret for Measurement Protocol hits.
    pub api_secret: String,
    /// Enable debug mode for GA4 validation (default: false).
    pub debug_mode: bool,
}

impl From<&AnalyticsConfig> for GaConfig {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            measurement_id: config.measurement_id.clone(),
            api_secret: config.api_secret.clone(),
            debug_mode: config.debug_mode,
        }
    }
}

/// Google Analytics 4 adaptor using the Measurement Protocol format.
pub struct GaAdaptor {
    config: GaConfig,
}

impl GaAdaptor {
    pub fn new(config: GaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    /// Lowercase alphanumerics and underscores, starting with a letter.
    /// Channel keys such as `google:organic` become `google_organic`.
    /// Over-long names keep a prefix plus a hash of the original key, so
    /// distinct keys sharing a long prefix stay distinct.
    fn param_name(key: &str) -> String {
        let mut name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            name.insert_str(0, "p_");
        }
        if name.len() > MAX_PARAM_NAME_LEN {
            let suffix = format!("_{:08x}", stable_hash(key));
            name.truncate(MAX_PARAM_NAME_LEN - suffix.len());
            name.push_str(&suffix);
        }
        name
    }

    fn param_value(value: &PropertyValue) -> serde_json::Value {
        match value {
            PropertyValue::Text(s) => serde_json::json!(s),
            PropertyValue::Number(n) => serde_json::json!(n),
            // GA4 has no boolean parameter type
            PropertyValue::Flag(b) => serde_json::json!(if *b { "true" } else { "false" }),
        }
    }

    fn build_params(&self, event: &AnalyticsEvent) -> serde_json::Value {
        let mut params = serde_json::Map::new();
        params.insert("event_category".into(), serde_json::json!(event.category));
        params.insert("event_label".into(), serde_json::json!(event.label));
        for (key, value) in &event.properties {
            params.insert(Self::param_name(key), Self::param_value(value));
        }
        if self.config.debug_mode {
            params.insert("debug_mode".into(), serde_json::json!(true));
        }
        serde_json::Value::Object(params)
    }
}

impl AnalyticsAdaptor for GaAdaptor {
    fn platform(&self) -> &str {
        "ga4"
    }

    fn transform(&self, event: &AnalyticsEvent) -> Result<serde_json::Value> {
        let Some(client_id) = event.client_id.as_deref() else {
            return Err(anyhow!(
                "event '{}' has no client_id, GA4 requires one",
                event.event_name
            ));
        };

        let payload = serde_json::json!({
            "client_id": client_id,
            "timestamp_micros": event.timestamp.timestamp_micros().to_string(),
            "events": [{
                "name": event.event_name,
                "params": self.build_params(event),
            }],
        });

        debug!(
            event_name = %event.event_name,
            measurement_id = %self.config.measurement_id,
            "GA4 event transformed"
        );

        Ok(payload)
    }

    fn validate_config(&self) -> Result<()> {
        if self.config.measurement_id.is_empty() {
            return Err(anyhow!("GA4 measurement_id must not be empty"));
        }
        if !self.config.measurement_id.starts_with("G-") {
            return Err(anyhow!(
                "GA4 measurement_id must start with 'G-', got '{}'",
                self.config.measurement_id
            ));
        }
        if self.config.api_secret.is_empty() {
            return Err(anyhow!("GA4 api_secret must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use insights_core::event_bus::{categories, names};

    fn test_config() -> GaConfig {
        GaConfig {
            measurement_id: "G-TEST12345".into(),
            api_secret: "secret-abc".into(),
            debug_mode: false,
        }
    }

    fn exposure() -> AnalyticsEvent {
        AnalyticsEvent::new(names::EXPERIMENT_EXPOSURE, categories::AB_TEST, "hero-cta")
            .with_client_id("visitor-42")
            .with("experiment_id", "hero-cta")
            .with("variant_id", "urgent")
            .with("user_segment", "new-mobile")
    }

    #[test]
    fn test_exposure_transform() {
        let adaptor = GaAdaptor::new(test_config());
        let payload = adaptor.transform(&exposure()).unwrap();
        assert_eq!(payload["client_id"], "visitor-42");

        let events = payload["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["name"], "experiment_exposure");
        assert_eq!(events[0]["params"]["event_category"], "ab_test");
        assert_eq!(events[0]["params"]["event_label"], "hero-cta");
        assert_eq!(events[0]["params"]["variant_id"], "urgent");
        assert!(events[0]["params"].get("debug_mode").is_none());
    }

    #[test]
    fn test_param_names_are_sanitized() {
        let adaptor = GaAdaptor::new(test_config());
        let event = AnalyticsEvent::new(names::ATTRIBUTION_SNAPSHOT, categories::ATTRIBUTION, "linear")
            .with_client_id("visitor-42")
            .with("google:organic", 62.5)
            .with("yelp:local-directory", 37.5)
            .with("is_target_metric", true);

        let payload = adaptor.transform(&event).unwrap();
        let params = &payload["events"][0]["params"];
        assert_eq!(params["google_organic"], 62.5);
        assert_eq!(params["yelp_local_directory"], 37.5);
        assert_eq!(params["is_target_metric"], "true");
    }

    #[test]
    fn test_param_name_rules() {
        assert_eq!(GaAdaptor::param_name("Google:Organic"), "google_organic");
        assert_eq!(GaAdaptor::param_name("3rd-party"), "p_3rd_party");
        assert_eq!(GaAdaptor::param_name(&"x".repeat(60)).len(), 40);
        assert_eq!(GaAdaptor::param_name(&"x".repeat(40)), "x".repeat(40));
    }

    #[test]
    fn test_long_channel_keys_do_not_collide() {
        let a = "closet-door-installers-directory.example.com:referral";
        let b = "closet-door-installers-directory.example.net:referral";
        let (name_a, name_b) = (GaAdaptor::param_name(a), GaAdaptor::param_name(b));
        assert_eq!(name_a.len(), 40);
        assert_eq!(name_b.len(), 40);
        assert_ne!(name_a, name_b);

        let adaptor = GaAdaptor::new(test_config());
        let event = AnalyticsEvent::new(names::ATTRIBUTION_SNAPSHOT, categories::ATTRIBUTION, "linear")
            .with_client_id("visitor-42")
            .with(a, 60.0)
            .with(b, 40.0);
        let payload = adaptor.transform(&event).unwrap();
        let params = payload["events"][0]["params"].as_object().unwrap();
        assert_eq!(params[&name_a], 60.0);
        assert_eq!(params[&name_b], 40.0);
    }

    #[test]
    fn test_missing_client_id_is_error() {
        let adaptor = GaAdaptor::new(test_config());
        let event = AnalyticsEvent::new(names::ROI_ATTRIBUTION, categories::ATTRIBUTION, "direct:none");
        assert!(adaptor.transform(&event).is_err());
    }

    #[test]
    fn test_debug_mode() {
        let adaptor = GaAdaptor::new(GaConfig {
            debug_mode: true,
            ..test_config()
        });
        let payload = adaptor.transform(&exposure()).unwrap();
        assert_eq!(payload["events"][0]["params"]["debug_mode"], true);
    }

    #[test]
    fn test_validate_config() {
        let adaptor = GaAdaptor::new(test_config());
        assert!(adaptor.validate_config().is_ok());

        let bad = GaAdaptor::new(GaConfig {
            measurement_id: "".into(),
            ..test_config()
        });
        assert!(bad.validate_config().is_err());

        let bad2 = GaAdaptor::new(GaConfig {
            measurement_id: "UA-12345".into(),
            ..test_config()
        });
        assert!(bad2.validate_config().is_err());

        let bad3 = GaAdaptor::new(GaConfig {
            api_secret: "".into(),
            ..test_config()
        });
        assert!(bad3.validate_config().is_err());
    }

    #[test]
    fn test_from_analytics_config() {
        let config = GaConfig::from(&AnalyticsConfig {
            measurement_id: "G-CLOSET01".into(),
            api_secret: "s".into(),
            debug_mode: true,
            ..Default::default()
        });
        assert_eq!(config.measurement_id, "G-CLOSET01");
        assert!(config.debug_mode);
    }

    #[test]
    fn test_batch_transform() {
        let adaptor = GaAdaptor::new(test_config());
        let mut conversion =
            AnalyticsEvent::new(names::EXPERIMENT_CONVERSION, categories::AB_TEST, "hero-cta");
        conversion.client_id = Some("visitor-42".into());

        let payloads = adaptor.transform_batch(&[exposure(), conversion]).unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1]["events"][0]["name"], "experiment_conversion");
    }
}
