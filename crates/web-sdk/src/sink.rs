//! Buffered event sink over an [`AnalyticsAdaptor`].
//!
//! Events are transformed on emit and queued as platform payloads for the
//! host to drain and ship. The queue is bounded: once full, new events are
//! dropped and counted rather than blocking the page.

use parking_lot::Mutex;
use tracing::{debug, warn};

use insights_core::config::AnalyticsConfig;
use insights_core::event_bus::{AnalyticsEvent, EventSink};

use crate::adaptors::ga::{GaAdaptor, GaConfig};
use crate::adaptors::AnalyticsAdaptor;

pub struct AdaptorSink<A: AnalyticsAdaptor> {
    adaptor: A,
    capacity: usize,
    queue: Mutex<Vec<serde_json::Value>>,
}

/// Sink forwarding to the GA4 Measurement Protocol.
pub type Ga4Sink = AdaptorSink<GaAdaptor>;

impl<A: AnalyticsAdaptor> AdaptorSink<A> {
    pub fn new(adaptor: A, capacity: usize) -> Self {
        Self {
            adaptor,
            capacity: capacity.max(1),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn adaptor(&self) -> &A {
        &self.adaptor
    }

    /// Take every queued payload, oldest first.
    pub fn drain(&self) -> Vec<serde_json::Value> {
        let drained = std::mem::take(&mut *self.queue.lock());
        debug!(
            platform = self.adaptor.platform(),
            count = drained.len(),
            "analytics queue drained"
        );
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Ga4Sink {
    /// Build from configuration, rejecting an incomplete GA4 setup.
    pub fn from_config(config: &AnalyticsConfig) -> anyhow::Result<Self> {
        let adaptor = GaAdaptor::new(GaConfig::from(config));
        adaptor.validate_config()?;
        Ok(Self::new(adaptor, config.buffer_capacity))
    }
}

impl<A: AnalyticsAdaptor> EventSink for AdaptorSink<A> {
    fn emit(&self, event: AnalyticsEvent) {
        let payload = match self.adaptor.transform(&event) {
            Ok(payload) => payload,
            Err(e) => {
                metrics::counter!("analytics.transform_errors").increment(1);
                warn!(
                    platform = self.adaptor.platform(),
                    event_name = %event.event_name,
                    error = %e,
                    "Analytics event dropped"
                );
                return;
            }
        };

        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            metrics::counter!("analytics.dropped").increment(1);
            warn!(
                platform = self.adaptor.platform(),
                event_name = %event.event_name,
                capacity = self.capacity,
                "Analytics queue full, event dropped"
            );
            return;
        }
        queue.push(payload);
        metrics::counter!("analytics.queued").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use insights_core::event_bus::{categories, names};

    fn config(capacity: usize) -> AnalyticsConfig {
        AnalyticsConfig {
            measurement_id: "G-CLOSET01".into(),
            api_secret: "secret".into(),
            buffer_capacity: capacity,
            debug_mode: false,
        }
    }

    fn event(label: &str) -> AnalyticsEvent {
        AnalyticsEvent::new(names::TOUCHPOINT_RECORDED, categories::ATTRIBUTION, label)
            .with_client_id("visitor-7")
            .with("source", "google")
    }

    #[test]
    fn test_queue_and_drain() {
        let sink = Ga4Sink::from_config(&config(10)).unwrap();
        sink.emit(event("google:organic"));
        sink.emit(event("direct:none"));
        assert_eq!(sink.len(), 2);

        let payloads = sink.drain();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["events"][0]["params"]["event_label"], "google:organic");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let sink = Ga4Sink::from_config(&config(2)).unwrap();
        for label in ["a", "b", "c"] {
            sink.emit(event(label));
        }
        let payloads = sink.drain();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1]["events"][0]["params"]["event_label"], "b");
    }

    #[test]
    fn test_untransformable_event_is_skipped() {
        let sink = Ga4Sink::from_config(&config(10)).unwrap();
        sink.emit(AnalyticsEvent::new(names::ROI_ATTRIBUTION, categories::ATTRIBUTION, "x"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_report_results_reach_ga4_queue() {
        use insights_core::types::{Experiment, VariantCounters};
        use insights_experiments::ExperimentReport;
        use std::collections::HashMap;

        let experiment: Experiment = serde_json::from_value(serde_json::json!({
            "id": "hero-cta",
            "name": "Hero CTA copy",
            "status": "running",
            "target_metric": "quote_request",
            "variants": [
                {"id": "control", "name": "Free Quote", "weight_percent": 50},
                {"id": "urgent", "name": "Book This Week", "weight_percent": 50}
            ]
        }))
        .unwrap();
        let counters = HashMap::from([
            ("control".to_string(), VariantCounters::new(1000, 30)),
            ("urgent".to_string(), VariantCounters::new(1000, 80)),
        ]);

        let sink = Ga4Sink::from_config(&config(10)).unwrap();
        ExperimentReport::build(&experiment, &counters).emit(&sink, "nightly-report");

        let payloads = sink.drain();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["client_id"], "nightly-report");
        assert_eq!(payloads[0]["events"][0]["name"], "significance_evaluated");
        assert_eq!(payloads[0]["events"][0]["params"]["is_significant"], "true");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(10);
        bad.measurement_id.clear();
        assert!(Ga4Sink::from_config(&bad).is_err());
    }
}
