//! Exposure and conversion recording for experiments.
//!
//! Both entry points degrade to silent no-ops on missing state: analytics
//! must never break the page.

use std::collections::HashSet;
use std::sync::Arc;

use insights_core::event_bus::{categories, names, noop_sink, AnalyticsEvent, EventSink};
use tracing::debug;

use crate::assignment::AssignmentEngine;

/// Per-session emission counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub exposures_sent: u64,
    pub conversions_sent: u64,
}

pub struct ExperimentRecorder {
    exposed: HashSet<String>,
    stats: RecorderStats,
    event_sink: Arc<dyn EventSink>,
}

impl Default for ExperimentRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentRecorder {
    pub fn new() -> Self {
        Self {
            exposed: HashSet::new(),
            stats: RecorderStats::default(),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Emit the exposure event, at most once per experiment per session.
    /// Returns whether an event was emitted.
    pub fn track_exposure(&mut self, engine: &AssignmentEngine, experiment_id: &str) -> bool {
        if self.exposed.contains(experiment_id) {
            return false;
        }
        let (Some(experiment), Some(variant)) = (
            engine.experiment(experiment_id),
            engine.variant_for(experiment_id),
        ) else {
            debug!(experiment_id, "exposure skipped, no resolved variant");
            return false;
        };

        self.event_sink.emit(
            AnalyticsEvent::new(names::EXPERIMENT_EXPOSURE, categories::AB_TEST, &experiment.id)
                .with_client_id(engine.user_id().as_str())
                .with("experiment_id", experiment.id.as_str())
                .with("experiment_name", experiment.name.as_str())
                .with("variant_id", variant.id.as_str())
                .with("variant_name", variant.name.as_str())
                .with("user_segment", engine.visitor().segment()),
        );
        self.exposed.insert(experiment_id.to_string());
        self.stats.exposures_sent += 1;
        true
    }

    /// Emit a conversion for the visitor's variant. Returns whether an event was emitted.
    pub fn track_conversion(
        &mut self,
        engine: &AssignmentEngine,
        experiment_id: &str,
        metric: &str,
        value: f64,
    ) -> bool {
        let (Some(experiment), Some(variant)) = (
            engine.experiment(experiment_id),
            engine.variant_for(experiment_id),
        ) else {
            debug!(experiment_id, metric, "conversion skipped, no resolved variant");
            return false;
        };

        self.event_sink.emit(
            AnalyticsEvent::new(names::EXPERIMENT_CONVERSION, categories::AB_TEST, &experiment.id)
                .with_client_id(engine.user_id().as_str())
                .with("experiment_id", experiment.id.as_str())
                .with("experiment_name", experiment.name.as_str())
                .with("variant_id", variant.id.as_str())
                .with("variant_name", variant.name.as_str())
                .with("metric", metric)
                .with("value", value)
                .with("target_metric", experiment.target_metric.as_str())
                .with("is_target_metric", metric == experiment.target_metric),
        );
        self.stats.conversions_sent += 1;
        true
    }

    pub fn has_exposed(&self, experiment_id: &str) -> bool {
        self.exposed.contains(experiment_id)
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::ExperimentRegistry;
    use crate::segments::{DeviceClass, VisitorContext};
    use insights_core::config::AllocationMode;
    use insights_core::event_bus::capture_sink;
    use insights_core::{MemoryStore, StableUserId};

    fn resolved_engine() -> AssignmentEngine {
        let registry = ExperimentRegistry::from_json(
            r#"[{
                "id": "hero-cta", "name": "Hero CTA copy", "status": "running",
                "target_metric": "quote_request",
                "variants": [{"id": "control", "name": "Get a Free Quote", "weight_percent": 100}]
            }]"#,
        )
        .unwrap();
        let mut engine = AssignmentEngine::new(
            Arc::new(registry),
            MemoryStore::shared(),
            "assignments",
            StableUserId::new("visitor-1"),
            VisitorContext::new(true, DeviceClass::Mobile),
            AllocationMode::Sticky,
        );
        engine.resolve_all();
        engine
    }

    #[test]
    fn test_exposure_is_idempotent_per_session() {
        let sink = capture_sink();
        let engine = resolved_engine();
        let mut recorder = ExperimentRecorder::new().with_event_sink(sink.clone());

        assert!(recorder.track_exposure(&engine, "hero-cta"));
        assert!(!recorder.track_exposure(&engine, "hero-cta"));

        assert_eq!(sink.count_named(names::EXPERIMENT_EXPOSURE), 1);
        let event = &sink.events()[0];
        assert_eq!(event.category, "ab_test");
        assert_eq!(event.client_id.as_deref(), Some("visitor-1"));
        assert_eq!(event.property("variant_name").unwrap().as_str(), Some("Get a Free Quote"));
        assert_eq!(event.property("user_segment").unwrap().as_str(), Some("returning-mobile"));
        assert_eq!(recorder.stats().exposures_sent, 1);
    }

    #[test]
    fn test_unknown_experiment_is_noop() {
        let sink = capture_sink();
        let engine = resolved_engine();
        let mut recorder = ExperimentRecorder::new().with_event_sink(sink.clone());

        assert!(!recorder.track_exposure(&engine, "nope"));
        assert!(!recorder.track_conversion(&engine, "nope", "quote_request", 1.0));
        assert_eq!(sink.count(), 0);
        assert!(!recorder.has_exposed("nope"));
    }

    #[test]
    fn test_conversion_flags_target_metric() {
        let sink = capture_sink();
        let engine = resolved_engine();
        let mut recorder = ExperimentRecorder::new().with_event_sink(sink.clone());

        assert!(recorder.track_conversion(&engine, "hero-cta", "quote_request", 1.0));
        assert!(recorder.track_conversion(&engine, "hero-cta", "gallery_click", 2.0));

        let events = sink.named(names::EXPERIMENT_CONVERSION);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].property("is_target_metric").unwrap().as_bool(), Some(true));
        assert_eq!(events[1].property("is_target_metric").unwrap().as_bool(), Some(false));
        assert_eq!(events[1].property("value").unwrap().as_f64(), Some(2.0));
        assert_eq!(
            events[1].property("target_metric").unwrap().as_str(),
            Some("quote_request")
        );
        assert_eq!(recorder.stats().conversions_sent, 2);
    }
}
