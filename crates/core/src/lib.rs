#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod hashing;
pub mod identity;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{InsightsError, InsightsResult};
pub use event_bus::{AnalyticsEvent, EventSink, PropertyValue};
pub use identity::StableUserId;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageKeys};
