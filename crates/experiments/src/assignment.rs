//! Variant assignment: deterministic bucketing with sticky, persisted results.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use insights_core::config::AllocationMode;
use insights_core::hashing::bucket_percent;
use insights_core::storage::{load_json, save_json, KeyValueStore};
use insights_core::types::{Experiment, UserAssignment, Variant};
use insights_core::StableUserId;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::registry::ExperimentRegistry;
use crate::segments::VisitorContext;

/// Pick the variant for a user. Same inputs, same variant, on every platform.
/// `None` only for an experiment without variants, which the registry rejects.
pub fn assign_variant<'a>(experiment: &'a Experiment, user_id: &StableUserId) -> Option<&'a Variant> {
    let bucket = bucket_percent(&format!("{}{}", user_id, experiment.id));

    let mut cumulative = 0.0;
    for variant in &experiment.variants {
        cumulative += variant.weight_percent;
        if bucket < cumulative {
            return Some(variant);
        }
    }
    // Weights summing slightly under 100 leave a sliver; it goes to the last arm.
    experiment.variants.last()
}

/// Eligibility gate: running, in an allowed segment, and inside the traffic allocation.
pub fn should_include_user(
    experiment: &Experiment,
    user_id: &StableUserId,
    visitor: &VisitorContext,
    mode: AllocationMode,
) -> bool {
    if !experiment.is_running() || !visitor.matches_any(&experiment.segments) {
        return false;
    }
    traffic_draw(experiment, user_id, mode) < experiment.traffic_allocation_percent
}

fn traffic_draw(experiment: &Experiment, user_id: &StableUserId, mode: AllocationMode) -> f64 {
    match mode {
        AllocationMode::Sticky => bucket_percent(&format!("traffic:{}:{}", experiment.id, user_id)),
        AllocationMode::PerAttempt => rand::thread_rng().gen_range(0.0..100.0),
    }
}

/// Resolves and remembers variant assignments for one visitor.
pub struct AssignmentEngine {
    registry: Arc<ExperimentRegistry>,
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    user_id: StableUserId,
    visitor: VisitorContext,
    mode: AllocationMode,
    assignments: BTreeMap<String, String>,
    excluded: HashSet<String>,
}

impl AssignmentEngine {
    pub fn new(
        registry: Arc<ExperimentRegistry>,
        store: Arc<dyn KeyValueStore>,
        storage_key: impl Into<String>,
        user_id: StableUserId,
        visitor: VisitorContext,
        mode: AllocationMode,
    ) -> Self {
        let storage_key = storage_key.into();
        let assignments = load_json(store.as_ref(), &storage_key).unwrap_or_default();
        Self {
            registry,
            store,
            storage_key,
            user_id,
            visitor,
            mode,
            assignments,
            excluded: HashSet::new(),
        }
    }

    /// Resolve every running experiment. Returns how many the visitor is in.
    pub fn resolve_all(&mut self) -> usize {
        let registry = Arc::clone(&self.registry);
        registry
            .running()
            .filter(|experiment| self.resolve_experiment(experiment))
            .count()
    }

    /// Resolve a single experiment, creating the assignment on first qualifying visit.
    pub fn resolve(&mut self, experiment_id: &str) -> Option<&Variant> {
        let registry = Arc::clone(&self.registry);
        let experiment = registry.get(experiment_id)?;
        if self.resolve_experiment(experiment) {
            self.variant_for(experiment_id)
        } else {
            None
        }
    }

    fn resolve_experiment(&mut self, experiment: &Experiment) -> bool {
        if !experiment.is_running() {
            return false;
        }
        if let Some(variant_id) = self.assignments.get(&experiment.id) {
            if experiment.variant(variant_id).is_some() {
                return true;
            }
            warn!(
                experiment_id = %experiment.id,
                variant_id = %variant_id,
                "stored assignment names an unknown variant, re-bucketing"
            );
            self.assignments.remove(&experiment.id);
            save_json(self.store.as_ref(), &self.storage_key, &self.assignments);
        }
        if self.excluded.contains(&experiment.id) {
            return false;
        }
        if !should_include_user(experiment, &self.user_id, &self.visitor, self.mode) {
            debug!(
                experiment_id = %experiment.id,
                segment = %self.visitor.segment(),
                "visitor not included in experiment"
            );
            self.excluded.insert(experiment.id.clone());
            return false;
        }

        let Some(variant) = assign_variant(experiment, &self.user_id) else {
            warn!(experiment_id = %experiment.id, "experiment has no variants");
            return false;
        };
        self.assignments
            .insert(experiment.id.clone(), variant.id.clone());
        save_json(self.store.as_ref(), &self.storage_key, &self.assignments);
        info!(
            experiment_id = %experiment.id,
            variant_id = %variant.id,
            "visitor assigned to variant"
        );
        true
    }

    /// The resolved variant, or `None` when the visitor has none or the
    /// experiment isn't running.
    pub fn variant_for(&self, experiment_id: &str) -> Option<&Variant> {
        let experiment = self.registry.get(experiment_id)?;
        if !experiment.is_running() {
            return None;
        }
        let variant_id = self.assignments.get(experiment_id)?;
        experiment.variant(variant_id)
    }

    pub fn experiment(&self, experiment_id: &str) -> Option<&Experiment> {
        self.registry.get(experiment_id)
    }

    pub fn assignments(&self) -> Vec<UserAssignment> {
        self.assignments
            .iter()
            .map(|(experiment_id, variant_id)| UserAssignment {
                experiment_id: experiment_id.clone(),
                variant_id: variant_id.clone(),
            })
            .collect()
    }

    pub fn user_id(&self) -> &StableUserId {
        &self.user_id
    }

    pub fn visitor(&self) -> &VisitorContext {
        &self.visitor
    }

    pub fn registry(&self) -> &ExperimentRegistry {
        &self.registry
    }
}
