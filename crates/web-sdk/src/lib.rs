//! Page-side wiring for site insights. Page-load hooks hold one
//! [`InsightsSession`]; its events can be forwarded to Google Analytics 4.
//!
//! # Modules
//!
//! - [`session`]: Session context tying assignment, recording and attribution together
//! - [`adaptors`]: Third-party analytics payload adaptors (GA4)
//! - [`sink`]: Buffered, fire-and-forget event sink over an adaptor
//! - [`maintenance`]: Interval task pruning the attribution ledger

#![warn(clippy::unwrap_used)]

pub mod adaptors;
pub mod maintenance;
pub mod session;
pub mod sink;

pub use adaptors::ga::GaAdaptor;
pub use adaptors::AnalyticsAdaptor;
pub use maintenance::MaintenanceHandle;
pub use session::{InsightsSession, PageLoad};
pub use sink::AdaptorSink;
