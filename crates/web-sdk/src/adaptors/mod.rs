//! Adaptors for translating analytics events into third-party formats.
//!
//! Each adaptor implements [`AnalyticsAdaptor`] to transform
//! [`AnalyticsEvent`]s into the JSON payload expected by its target platform.

pub mod ga;

use anyhow::Result;
use insights_core::event_bus::AnalyticsEvent;

/// Adaptor trait: transforms analytics events into a platform-specific JSON payload.
pub trait AnalyticsAdaptor: Send + Sync {
    /// Platform identifier (e.g. "ga4").
    fn platform(&self) -> &str;

    /// Transform an event into the target platform's payload format.
    fn transform(&self, event: &AnalyticsEvent) -> Result<serde_json::Value>;

    /// Transform a batch of events. Default implementation transforms one-by-one.
    fn transform_batch(&self, events: &[AnalyticsEvent]) -> Result<Vec<serde_json::Value>> {
        events.iter().map(|e| self.transform(e)).collect()
    }

    /// Validate that the adaptor configuration is correct.
    fn validate_config(&self) -> Result<()>;
}
