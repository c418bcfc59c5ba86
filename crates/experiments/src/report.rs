//! Experiment reports: every variant evaluated against the control arm.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use insights_core::event_bus::{categories, names, AnalyticsEvent, EventSink};
use insights_core::types::{Experiment, VariantCounters};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::significance::{evaluate, SignificanceResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmReport {
    pub variant_id: String,
    pub variant_name: String,
    pub counters: VariantCounters,
    pub conversion_rate: f64,
    pub sample_size_reached: bool,
    /// `None` for the control arm.
    pub versus_control: Option<SignificanceResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub control_variant_id: String,
    pub confidence_level: f64,
    pub arms: Vec<ArmReport>,
    /// Best significant, positive-lift arm with enough samples on both sides.
    pub winner: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ExperimentReport {
    /// Build a report from externally accumulated counters. The first variant
    /// is the control; variants without counters count as zero.
    pub fn build(experiment: &Experiment, counters: &HashMap<String, VariantCounters>) -> Self {
        let control = experiment.control();
        let control_id = control.map(|v| v.id.clone()).unwrap_or_default();
        let control_counters = counters.get(&control_id).copied().unwrap_or_default();
        let control_ready = control_counters.visitors >= experiment.minimum_sample_size;

        let mut arms = Vec::with_capacity(experiment.variants.len());
        let mut winner: Option<(String, f64)> = None;

        for (i, variant) in experiment.variants.iter().enumerate() {
            let arm_counters = counters.get(&variant.id).copied().unwrap_or_default();
            let sample_size_reached = arm_counters.visitors >= experiment.minimum_sample_size;

            let versus_control = (i > 0).then(|| {
                evaluate(
                    control_counters.conversions,
                    control_counters.visitors,
                    arm_counters.conversions,
                    arm_counters.visitors,
                    experiment.confidence_level,
                )
            });

            if let Some(result) = versus_control {
                let eligible = result.is_significant
                    && result.variant_rate > result.control_rate
                    && sample_size_reached
                    && control_ready;
                let better = winner
                    .as_ref()
                    .map_or(true, |(_, best)| result.variant_rate > *best);
                if eligible && better {
                    winner = Some((variant.id.clone(), result.variant_rate));
                }
            }

            arms.push(ArmReport {
                variant_id: variant.id.clone(),
                variant_name: variant.name.clone(),
                counters: arm_counters,
                conversion_rate: arm_counters.conversion_rate(),
                sample_size_reached,
                versus_control,
            });
        }

        let report = Self {
            experiment_id: experiment.id.clone(),
            control_variant_id: control_id,
            confidence_level: experiment.confidence_level,
            arms,
            winner: winner.map(|(id, _)| id),
            generated_at: Utc::now(),
        };
        info!(
            experiment_id = %report.experiment_id,
            winner = ?report.winner,
            "experiment report built"
        );
        report
    }

    /// Forward one `significance_evaluated` event per non-control arm,
    /// attributed to `client_id` (the reporting host, not a visitor).
    pub fn emit(&self, sink: &dyn EventSink, client_id: &str) {
        for arm in &self.arms {
            let Some(result) = arm.versus_control else {
                continue;
            };
            sink.emit(
                AnalyticsEvent::new(
                    names::SIGNIFICANCE_EVALUATED,
                    categories::AB_TEST,
                    &self.experiment_id,
                )
                .with_client_id(client_id)
                .with("experiment_id", self.experiment_id.as_str())
                .with("control_variant_id", self.control_variant_id.as_str())
                .with("variant_id", arm.variant_id.as_str())
                .with("z_score", result.z_score)
                .with("p_value", result.p_value)
                .with("confidence", result.confidence)
                .with("is_significant", result.is_significant)
                .with("sample_size_reached", arm.sample_size_reached),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use insights_core::event_bus::capture_sink;

    fn experiment(min_sample: u64) -> Experiment {
        serde_json::from_value(serde_json::json!({
            "id": "hero-cta",
            "name": "Hero CTA copy",
            "status": "running",
            "target_metric": "quote_request",
            "minimum_sample_size": min_sample,
            "variants": [
                {"id": "control", "name": "Free Quote", "weight_percent": 34},
                {"id": "urgent", "name": "Book This Week", "weight_percent": 33},
                {"id": "local", "name": "Local Installers", "weight_percent": 33}
            ]
        }))
        .unwrap()
    }

    fn counters() -> HashMap<String, VariantCounters> {
        HashMap::from([
            ("control".to_string(), VariantCounters::new(1000, 30)),
            ("urgent".to_string(), VariantCounters::new(1000, 80)),
            ("local".to_string(), VariantCounters::new(1000, 35)),
        ])
    }

    #[test]
    fn test_report_picks_significant_winner() {
        let report = ExperimentReport::build(&experiment(500), &counters());
        assert_eq!(report.control_variant_id, "control");
        assert_eq!(report.arms.len(), 3);
        assert!(report.arms[0].versus_control.is_none());
        assert!(report.arms[1].versus_control.unwrap().is_significant);
        assert!(!report.arms[2].versus_control.unwrap().is_significant);
        assert_eq!(report.winner.as_deref(), Some("urgent"));
    }

    #[test]
    fn test_no_winner_below_minimum_sample() {
        let report = ExperimentReport::build(&experiment(5000), &counters());
        assert!(!report.arms[1].sample_size_reached);
        assert!(report.winner.is_none());
    }

    #[test]
    fn test_missing_counters_are_zero() {
        let report = ExperimentReport::build(&experiment(0), &HashMap::new());
        let result = report.arms[1].versus_control.unwrap();
        assert_eq!(result.p_value, 1.0);
        assert!(report.winner.is_none());
    }

    #[test]
    fn test_emit_one_event_per_challenger() {
        let sink = capture_sink();
        ExperimentReport::build(&experiment(500), &counters()).emit(sink.as_ref(), "report-job");
        let events = sink.named(names::SIGNIFICANCE_EVALUATED);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.client_id.as_deref() == Some("report-job")));
        assert_eq!(events[0].property("variant_id").unwrap().as_str(), Some("urgent"));
        assert_eq!(events[0].property("is_significant").unwrap().as_bool(), Some(true));
    }
}
