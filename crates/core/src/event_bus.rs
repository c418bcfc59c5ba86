//! Analytics event bus: trait for emitting named events from any component.
//!
//! Components accept an `Arc<dyn EventSink>` and emit flat, named events.
//! Emission is fire-and-forget: sinks never report failure back to callers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known event names.
pub mod names {
    pub const EXPERIMENT_EXPOSURE: &str = "experiment_exposure";
    pub const EXPERIMENT_CONVERSION: &str = "experiment_conversion";
    pub const TOUCHPOINT_RECORDED: &str = "touchpoint_recorded";
    pub const ATTRIBUTION_SNAPSHOT: &str = "attribution_snapshot";
    pub const ROI_ATTRIBUTION: &str = "roi_attribution";
    pub const SIGNIFICANCE_EVALUATED: &str = "significance_evaluated";
}

/// Well-known event categories.
pub mod categories {
    pub const AB_TEST: &str = "ab_test";
    pub const ATTRIBUTION: &str = "attribution";
}

/// Scalar property value. The property bag is always flat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::Number(v as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Flag(v)
    }
}

/// A named analytics event with a flat property bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub category: String,
    pub label: String,
    pub client_id: Option<String>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(
        event_name: impl Into<String>,
        category: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_name: event_name.into(),
            category: category.into(),
            label: label.into(),
            client_id: None,
            properties: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_opt(self, key: impl Into<String>, value: Option<impl Into<PropertyValue>>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// Trait for emitting analytics events. Implementations forward to GA4,
/// buffer for a beacon, or capture for tests.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// No-op sink for hosts that don't forward analytics.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: AnalyticsEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_named(&self, event_name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_name == event_name)
            .count()
    }

    pub fn named(&self, event_name: &str) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_name == event_name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: AnalyticsEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience: create a no-op sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
