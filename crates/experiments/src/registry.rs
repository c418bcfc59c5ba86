//! Experiment registry: the closed set of experiments for a session.
//!
//! Definitions are validated once, at load. Anything that passes here is safe
//! to bucket against without further checks.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use insights_core::types::Experiment;
use insights_core::{InsightsError, InsightsResult};
use tracing::info;

const WEIGHT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct ExperimentRegistry {
    experiments: Vec<Experiment>,
    index: HashMap<String, usize>,
}

impl ExperimentRegistry {
    /// Build a registry, rejecting malformed definitions.
    pub fn new(experiments: Vec<Experiment>) -> InsightsResult<Self> {
        let mut index = HashMap::with_capacity(experiments.len());
        for (i, experiment) in experiments.iter().enumerate() {
            validate(experiment)?;
            if index.insert(experiment.id.clone(), i).is_some() {
                return Err(InsightsError::invalid_experiment(
                    &experiment.id,
                    "duplicate experiment id",
                ));
            }
        }
        info!(count = experiments.len(), "experiment registry loaded");
        Ok(Self { experiments, index })
    }

    /// Parse a JSON array of experiment definitions.
    pub fn from_json(raw: &str) -> InsightsResult<Self> {
        let experiments: Vec<Experiment> = serde_json::from_str(raw)?;
        Self::new(experiments)
    }

    pub fn from_path(path: impl AsRef<Path>) -> InsightsResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, experiment_id: &str) -> Option<&Experiment> {
        self.index.get(experiment_id).map(|&i| &self.experiments[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.iter()
    }

    pub fn running(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.iter().filter(|e| e.is_running())
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

fn validate(experiment: &Experiment) -> InsightsResult<()> {
    let fail = |reason: String| -> InsightsResult<()> {
        Err(InsightsError::invalid_experiment(&experiment.id, reason))
    };

    if experiment.id.trim().is_empty() {
        return fail("experiment id must not be empty".into());
    }
    if experiment.variants.is_empty() {
        return fail("experiment has no variants".into());
    }
    if !(0.0..=100.0).contains(&experiment.traffic_allocation_percent) {
        return fail(format!(
            "traffic allocation {} is outside 0-100",
            experiment.traffic_allocation_percent
        ));
    }
    if !(experiment.confidence_level > 0.0 && experiment.confidence_level < 100.0) {
        return fail(format!(
            "confidence level {} must be between 0 and 100 exclusive",
            experiment.confidence_level
        ));
    }

    let mut seen = HashSet::new();
    let mut total = 0.0;
    for variant in &experiment.variants {
        if !seen.insert(variant.id.as_str()) {
            return fail(format!("duplicate variant id '{}'", variant.id));
        }
        if !variant.weight_percent.is_finite() || variant.weight_percent < 0.0 {
            return fail(format!(
                "variant '{}' has invalid weight {}",
                variant.id, variant.weight_percent
            ));
        }
        if variant.config.keys().any(|k| k.trim().is_empty()) {
            return fail(format!("variant '{}' has an empty config key", variant.id));
        }
        total += variant.weight_percent;
    }
    if (total - 100.0).abs() > WEIGHT_TOLERANCE {
        return fail(format!("variant weights sum to {total}, expected 100"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"[
        {
            "id": "hero-cta",
            "name": "Hero CTA copy",
            "status": "running",
            "target_metric": "quote_request",
            "variants": [
                {"id": "control", "name": "Get a Free Quote", "weight_percent": 50},
                {"id": "urgent", "name": "Book This Week", "weight_percent": 50}
            ]
        },
        {
            "id": "quote-form-steps",
            "name": "Quote form length",
            "status": "draft",
            "target_metric": "contact_form",
            "traffic_allocation_percent": 40,
            "variants": [
                {"id": "three-step", "name": "Three steps", "weight_percent": 33.3},
                {"id": "two-step", "name": "Two steps", "weight_percent": 33.3},
                {"id": "one-step", "name": "Single page", "weight_percent": 33.4}
            ]
        }
    ]"#;

    #[test]
    fn test_load_from_json() {
        let registry = ExperimentRegistry::from_json(DEFINITIONS).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.running().count(), 1);
        assert_eq!(
            registry.get("quote-form-steps").unwrap().traffic_allocation_percent,
            40.0
        );
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.json");
        std::fs::write(&path, DEFINITIONS).unwrap();
        assert_eq!(ExperimentRegistry::from_path(&path).unwrap().len(), 2);
    }

    fn with_variants(variants: &str) -> String {
        format!(
            r#"[{{"id": "x", "name": "X", "status": "running", "target_metric": "m",
                 "variants": {variants}}}]"#
        )
    }

    #[test]
    fn test_rejects_empty_variants() {
        let err = ExperimentRegistry::from_json(&with_variants("[]")).unwrap_err();
        assert!(matches!(err, InsightsError::InvalidExperiment { .. }));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let short = with_variants(
            r#"[{"id": "a", "name": "A", "weight_percent": 50},
                {"id": "b", "name": "B", "weight_percent": 40}]"#,
        );
        assert!(ExperimentRegistry::from_json(&short).is_err());

        let negative = with_variants(
            r#"[{"id": "a", "name": "A", "weight_percent": 120},
                {"id": "b", "name": "B", "weight_percent": -20}]"#,
        );
        assert!(ExperimentRegistry::from_json(&negative).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let dup_variant = with_variants(
            r#"[{"id": "a", "name": "A", "weight_percent": 50},
                {"id": "a", "name": "A again", "weight_percent": 50}]"#,
        );
        assert!(ExperimentRegistry::from_json(&dup_variant).is_err());

        let one: Vec<Experiment> = serde_json::from_str(&with_variants(
            r#"[{"id": "a", "name": "A", "weight_percent": 100}]"#,
        ))
        .unwrap();
        let two = vec![one[0].clone(), one[0].clone()];
        assert!(ExperimentRegistry::new(two).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            ExperimentRegistry::from_json("{").unwrap_err(),
            InsightsError::Serialization(_)
        ));
    }
}
