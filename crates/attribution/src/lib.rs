//! Multi-touch attribution over a bounded touchpoint ledger kept in client
//! storage.
//!
//! # Modules
//!
//! - [`channels`]: Campaign/referrer classification and channel values
//! - [`ledger`]: Windowed, bounded touchpoint and conversion history
//! - [`models`]: The four attribution models
//! - [`tracker`]: Page-load and conversion entry points

#![warn(clippy::unwrap_used)]

pub mod channels;
pub mod ledger;
pub mod models;
pub mod tracker;

pub use channels::{ChannelMatch, PageVisit};
pub use ledger::{LedgerPolicy, TouchpointLedger};
pub use models::compute_weights;
pub use tracker::AttributionTracker;
