//! Attribution tracker: records a touchpoint per qualifying page load and
//! snapshots the attribution models whenever a lead converts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use insights_core::config::AttributionConfig;
use insights_core::event_bus::{categories, names, noop_sink, AnalyticsEvent, EventSink};
use insights_core::storage::KeyValueStore;
use insights_core::types::{AttributionWeights, ChannelWeights, Conversion, Touchpoint};
use tracing::{debug, info};

use crate::channels::{self, PageVisit};
use crate::ledger::{LedgerPolicy, TouchpointLedger};
use crate::models::compute_weights;

pub struct AttributionTracker {
    ledger: TouchpointLedger,
    weights: AttributionWeights,
    config: AttributionConfig,
    first_visit: bool,
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    client_id: Option<String>,
    event_sink: Arc<dyn EventSink>,
}

impl AttributionTracker {
    /// Load the persisted ledger (pruned to the window) and compute the
    /// current weights.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        storage_key: impl Into<String>,
        config: AttributionConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let storage_key = storage_key.into();
        let (ledger, existed) = TouchpointLedger::load(
            store.as_ref(),
            &storage_key,
            LedgerPolicy::from_config(&config),
            now,
        );
        let weights = compute_weights(ledger.touchpoints(), now, config.decay_days);
        Self {
            ledger,
            weights,
            config,
            first_visit: !existed,
            store,
            storage_key,
            client_id: None,
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Whether this visitor had no stored ledger when the tracker loaded.
    pub fn is_first_visit(&self) -> bool {
        self.first_visit
    }

    /// Record the touchpoint for a page load, if the visit qualifies.
    /// The ledger is persisted either way so the next load is not a first visit.
    pub fn record_visit(&mut self, visit: &PageVisit) -> Option<Touchpoint> {
        let now = visit.timestamp;
        let matched = channels::identify(visit, &self.config.site_host, self.first_visit);

        let touchpoint = matched.map(|m| Touchpoint {
            timestamp: now,
            value: channels::channel_value(&m.source, &m.medium),
            source: m.source,
            medium: m.medium,
            campaign: m.campaign,
            content: m.content,
            term: m.term,
            page: visit.url.path().to_string(),
        });

        if let Some(ref tp) = touchpoint {
            self.ledger.append(tp.clone());
        }
        self.ledger.prune(now);

        if let Some(ref tp) = touchpoint {
            info!(
                channel = %tp.channel(),
                value = tp.value,
                page = %tp.page,
                "touchpoint recorded"
            );
            self.emit(
                AnalyticsEvent::new(names::TOUCHPOINT_RECORDED, categories::ATTRIBUTION, tp.channel())
                    .with("source", tp.source.as_str())
                    .with("medium", tp.medium.as_str())
                    .with_opt("campaign", tp.campaign.clone())
                    .with_opt("content", tp.content.clone())
                    .with_opt("term", tp.term.clone())
                    .with("page", tp.page.as_str())
                    .with("value", tp.value)
                    .with("touchpoint_count", self.ledger.touchpoints().len() as u64)
                    .with_timestamp(now),
            );
        } else {
            debug!(page = %visit.url.path(), "visit did not qualify as a touchpoint");
        }

        self.recompute(now);
        self.ledger.persist(self.store.as_ref(), &self.storage_key);
        self.first_visit = false;
        touchpoint
    }

    /// Record a conversion with a snapshot of the current attribution, and
    /// emit ROI credit per channel from the time-decay model.
    pub fn record_conversion(
        &mut self,
        conversion_type: &str,
        value: Option<f64>,
        now: DateTime<Utc>,
    ) -> Conversion {
        let value = value.unwrap_or_else(|| self.config.default_value_for(conversion_type));
        self.ledger.prune(now);
        self.recompute(now);

        let conversion = Conversion {
            conversion_type: conversion_type.to_string(),
            value,
            timestamp: now,
            attribution: self.weights.clone(),
        };
        self.ledger.push_conversion(conversion.clone());
        self.ledger.persist(self.store.as_ref(), &self.storage_key);

        info!(
            conversion_type,
            value,
            touchpoints = self.ledger.touchpoints().len(),
            "conversion attributed"
        );

        let models: [(&str, &ChannelWeights); 4] = [
            ("first_touch", &conversion.attribution.first_touch),
            ("last_touch", &conversion.attribution.last_touch),
            ("linear", &conversion.attribution.linear),
            ("time_decay", &conversion.attribution.time_decay),
        ];
        for (model, weights) in models {
            let event = weights.iter().fold(
                AnalyticsEvent::new(names::ATTRIBUTION_SNAPSHOT, categories::ATTRIBUTION, model)
                    .with("conversion_type", conversion_type)
                    .with("conversion_value", value),
                |event, (channel, pct)| event.with(channel.as_str(), *pct),
            );
            self.emit(event.with_timestamp(now));
        }

        for (channel, pct) in &conversion.attribution.time_decay {
            self.emit(
                AnalyticsEvent::new(names::ROI_ATTRIBUTION, categories::ATTRIBUTION, channel.as_str())
                    .with("conversion_type", conversion_type)
                    .with("attributed_value", value * pct / 100.0)
                    .with("weight_percent", *pct)
                    .with_timestamp(now),
            );
        }

        conversion
    }

    /// Drop touchpoints that fell out of the window. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.ledger.prune(now);
        if removed > 0 {
            self.recompute(now);
            self.ledger.persist(self.store.as_ref(), &self.storage_key);
            debug!(removed, "pruned expired touchpoints");
        }
        removed
    }

    fn recompute(&mut self, now: DateTime<Utc>) {
        self.weights = compute_weights(self.ledger.touchpoints(), now, self.config.decay_days);
    }

    fn emit(&self, event: AnalyticsEvent) {
        let event = match &self.client_id {
            Some(id) => event.with_client_id(id.as_str()),
            None => event,
        };
        self.event_sink.emit(event);
    }

    pub fn weights(&self) -> &AttributionWeights {
        &self.weights
    }

    pub fn touchpoints(&self) -> &[Touchpoint] {
        self.ledger.touchpoints()
    }

    pub fn conversions(&self) -> &[Conversion] {
        self.ledger.conversions()
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }
}
