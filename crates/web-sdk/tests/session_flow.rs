//! End-to-end visitor journey over a file-backed store with GA4 forwarding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use insights_core::config::AnalyticsConfig;
use insights_core::types::VariantCounters;
use insights_core::{AppConfig, JsonFileStore};
use insights_experiments::{ExperimentRegistry, ExperimentReport};
use insights_web_sdk::sink::Ga4Sink;
use insights_web_sdk::{InsightsSession, PageLoad};

const DEFINITIONS: &str = r#"[
    {
        "id": "hero-cta",
        "name": "Hero CTA copy",
        "status": "running",
        "target_metric": "quote_request",
        "variants": [
            {"id": "control", "name": "Get a Free Quote", "weight_percent": 50,
             "config": {"cta_text": "Get a Free Quote"}},
            {"id": "urgent", "name": "Book This Week", "weight_percent": 50,
             "config": {"cta_text": "Book Your Install This Week"}}
        ]
    },
    {
        "id": "mobile-sticky-call",
        "name": "Sticky call button",
        "status": "running",
        "target_metric": "phone_call",
        "segments": ["mobile"],
        "variants": [
            {"id": "off", "name": "No button", "weight_percent": 50},
            {"id": "on", "name": "Sticky button", "weight_percent": 50}
        ]
    }
]"#;

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.attribution.site_host = "closetdoors.example".into();
    config.analytics = AnalyticsConfig {
        measurement_id: "G-CLOSET01".into(),
        api_secret: "secret".into(),
        ..Default::default()
    };
    config
}

#[test]
fn visitor_journey_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("insights.json");
    let registry = Arc::new(ExperimentRegistry::from_json(DEFINITIONS).unwrap());
    let sink = Arc::new(Ga4Sink::from_config(&config().analytics).unwrap());
    let start = Utc::now() - Duration::days(6);

    // Day 0: lands from organic search on desktop.
    let mut first = InsightsSession::start(
        config(),
        registry.clone(),
        Arc::new(JsonFileStore::open(&path)),
        sink.clone(),
        &PageLoad::new("/sliding-closet-doors")
            .with_referrer("https://www.google.com/")
            .with_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .at(start),
    );
    assert_eq!(first.segment(), "new-desktop");
    assert_eq!(first.assignments().len(), 1);
    let cta = first.variant_config("hero-cta", "cta_text").cloned().unwrap();
    assert!(first.track_exposure("hero-cta"));

    // Internal navigation adds nothing.
    assert!(first
        .on_page_load(
            &PageLoad::new("/gallery")
                .with_referrer("https://closetdoors.example/sliding-closet-doors")
                .at(start + Duration::minutes(2)),
        )
        .is_none());
    let user = first.user_id().clone();
    drop(first);

    // Day 5: returns on a phone from a Yelp listing and requests a quote.
    let mut second = InsightsSession::start(
        config(),
        registry,
        Arc::new(JsonFileStore::open(&path)),
        sink.clone(),
        &PageLoad::new("/contact")
            .with_referrer("https://www.yelp.com/biz/closet-doors-co")
            .with_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari")
            .at(start + Duration::days(5)),
    );
    assert_eq!(second.user_id(), &user);
    assert_eq!(second.segment(), "returning-mobile");
    assert_eq!(second.variant_config("hero-cta", "cta_text"), Some(&cta));
    assert!(second.variant("mobile-sticky-call").is_some());

    let conversion = second.record_lead_at("quote_request", None, start + Duration::days(6));
    assert_eq!(conversion.value, 150.0);
    let weights = &conversion.attribution;
    assert_eq!(weights.first_touch["google:organic"], 100.0);
    assert_eq!(weights.last_touch["yelp:local-directory"], 100.0);
    assert_eq!(weights.linear["google:organic"], 50.0);
    assert!(weights.time_decay["yelp:local-directory"] > weights.time_decay["google:organic"]);

    let payloads = sink.drain();
    let names: Vec<&str> = payloads
        .iter()
        .filter_map(|p| p["events"][0]["name"].as_str())
        .collect();
    assert_eq!(names.iter().filter(|n| **n == "touchpoint_recorded").count(), 2);
    assert_eq!(names.iter().filter(|n| **n == "experiment_exposure").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "experiment_conversion").count(), 2);
    assert_eq!(names.iter().filter(|n| **n == "attribution_snapshot").count(), 4);
    assert_eq!(names.iter().filter(|n| **n == "roi_attribution").count(), 2);
    assert!(payloads.iter().all(|p| p["client_id"] == user.as_str()));

    // Everything survived the store round trip.
    let reopened = JsonFileStore::open(&path);
    assert_eq!(reopened.path(), path.as_path());
    let third = InsightsSession::start(
        config(),
        Arc::new(ExperimentRegistry::from_json(DEFINITIONS).unwrap()),
        Arc::new(reopened),
        sink,
        &PageLoad::new("/").at(start + Duration::days(6)),
    );
    assert_eq!(third.conversions().len(), 1);
    assert_eq!(third.touchpoints().len(), 2);
}

#[test]
fn report_over_collected_counters() {
    let registry = ExperimentRegistry::from_json(DEFINITIONS).unwrap();
    let experiment = registry.get("hero-cta").unwrap();
    let counters = HashMap::from([
        ("control".to_string(), VariantCounters::new(1000, 32)),
        ("urgent".to_string(), VariantCounters::new(1000, 41)),
    ]);
    let report = ExperimentReport::build(experiment, &counters);
    assert!(report.winner.is_none());
}
