//! The per-visitor session context.
//!
//! A page creates one [`InsightsSession`] on load and routes every
//! experiment and attribution call through it. Nothing here fails the page:
//! storage and URL problems are logged and the session carries on with what
//! it has.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use insights_attribution::{AttributionTracker, PageVisit};
use insights_core::event_bus::EventSink;
use insights_core::types::{AttributionWeights, Conversion, Touchpoint, UserAssignment, Variant};
use insights_core::{AppConfig, KeyValueStore, StableUserId, StorageKeys};
use insights_experiments::{
    AssignmentEngine, DeviceClass, ExperimentRecorder, ExperimentRegistry, VisitorContext,
};

use crate::maintenance::{spawn_ledger_cleanup, MaintenanceHandle};

/// What the page knows about itself at load time.
#[derive(Debug, Clone)]
pub struct PageLoad {
    /// Absolute URL or site-relative path, including the query string.
    pub location: String,
    pub referrer: Option<String>,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl PageLoad {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            referrer: None,
            user_agent: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub struct InsightsSession {
    config: AppConfig,
    engine: AssignmentEngine,
    recorder: ExperimentRecorder,
    tracker: Arc<Mutex<AttributionTracker>>,
}

impl InsightsSession {
    /// Identify the visitor, resolve every running experiment and record the
    /// landing page as a touchpoint.
    pub fn start(
        config: AppConfig,
        registry: Arc<ExperimentRegistry>,
        store: Arc<dyn KeyValueStore>,
        event_sink: Arc<dyn EventSink>,
        page: &PageLoad,
    ) -> Self {
        let keys = StorageKeys::with_prefix(&config.storage.key_prefix);
        let user_id = StableUserId::load_or_create(store.as_ref(), &keys.stable_user_id);

        let tracker = AttributionTracker::load(
            store.clone(),
            keys.attribution.as_str(),
            config.attribution.clone(),
            page.timestamp,
        )
        .with_event_sink(event_sink.clone())
        .with_client_id(user_id.as_str());

        let visitor = VisitorContext::new(
            !tracker.is_first_visit(),
            DeviceClass::from_user_agent(&page.user_agent),
        );

        let mut engine = AssignmentEngine::new(
            registry,
            store,
            keys.experiment_assignments.as_str(),
            user_id,
            visitor,
            config.experiments.allocation_mode,
        );
        let enrolled = engine.resolve_all();

        info!(
            user_id = %engine.user_id(),
            segment = %engine.visitor().segment(),
            enrolled,
            "insights session started"
        );

        let mut session = Self {
            config,
            engine,
            recorder: ExperimentRecorder::new().with_event_sink(event_sink),
            tracker: Arc::new(Mutex::new(tracker)),
        };
        session.on_page_load(page);
        session
    }

    /// Record the touchpoint for a subsequent page load in the same session.
    pub fn on_page_load(&mut self, page: &PageLoad) -> Option<Touchpoint> {
        let visit = match PageVisit::from_location(
            &page.location,
            page.referrer.as_deref(),
            page.timestamp,
            &self.config.attribution.site_host,
        ) {
            Ok(visit) => visit,
            Err(e) => {
                warn!(location = %page.location, error = %e, "unparseable page location");
                return None;
            }
        };
        self.tracker.lock().record_visit(&visit)
    }

    /// The visitor's variant, assigning one if the visitor qualifies.
    pub fn variant(&mut self, experiment_id: &str) -> Option<&Variant> {
        self.engine.resolve(experiment_id)
    }

    /// One entry of the variant's configuration, for the page to render.
    pub fn variant_config(&mut self, experiment_id: &str, key: &str) -> Option<&serde_json::Value> {
        self.variant(experiment_id)?.config.get(key)
    }

    pub fn track_exposure(&mut self, experiment_id: &str) -> bool {
        self.recorder.track_exposure(&self.engine, experiment_id)
    }

    pub fn track_conversion(&mut self, experiment_id: &str, metric: &str) -> bool {
        self.track_conversion_value(experiment_id, metric, 1.0)
    }

    pub fn track_conversion_value(&mut self, experiment_id: &str, metric: &str, value: f64) -> bool {
        self.recorder
            .track_conversion(&self.engine, experiment_id, metric, value)
    }

    /// Record a lead: one attribution conversion, plus an experiment
    /// conversion for every running experiment the visitor is assigned to.
    pub fn record_lead(&mut self, conversion_type: &str, value: Option<f64>) -> Conversion {
        self.record_lead_at(conversion_type, value, Utc::now())
    }

    pub fn record_lead_at(
        &mut self,
        conversion_type: &str,
        value: Option<f64>,
        now: DateTime<Utc>,
    ) -> Conversion {
        let conversion = self
            .tracker
            .lock()
            .record_conversion(conversion_type, value, now);

        let experiments = self
            .engine
            .assignments()
            .into_iter()
            .filter(|assignment| {
                self.recorder.track_conversion(
                    &self.engine,
                    &assignment.experiment_id,
                    conversion_type,
                    conversion.value,
                )
            })
            .count();

        info!(
            conversion_type,
            value = conversion.value,
            experiments,
            "lead recorded"
        );
        conversion
    }

    pub fn attribution_weights(&self) -> AttributionWeights {
        self.tracker.lock().weights().clone()
    }

    pub fn touchpoints(&self) -> Vec<Touchpoint> {
        self.tracker.lock().touchpoints().to_vec()
    }

    pub fn conversions(&self) -> Vec<Conversion> {
        self.tracker.lock().conversions().to_vec()
    }

    pub fn user_id(&self) -> &StableUserId {
        self.engine.user_id()
    }

    pub fn segment(&self) -> String {
        self.engine.visitor().segment()
    }

    pub fn is_returning(&self) -> bool {
        self.engine.visitor().is_returning
    }

    pub fn assignments(&self) -> Vec<UserAssignment> {
        self.engine.assignments()
    }

    pub fn recorder(&self) -> &ExperimentRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start periodic ledger pruning at the configured interval. Requires a
    /// tokio runtime.
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        let every = Duration::from_secs(self.config.attribution.cleanup_interval_secs.max(1));
        spawn_ledger_cleanup(self.tracker.clone(), every)
    }
}
