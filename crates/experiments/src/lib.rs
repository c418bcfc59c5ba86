//! A/B testing with sticky per-visitor assignment and a two-proportion
//! significance test for reading the results.
//!
//! # Modules
//!
//! - [`registry`]: Experiment definitions, validated at load
//! - [`segments`]: Visitor segment derivation for audience filters
//! - [`assignment`]: Deterministic bucketing and persisted assignments
//! - [`recorder`]: Once-per-session exposure and conversion events
//! - [`significance`]: z-test evaluator
//! - [`report`]: Per-experiment results against the control arm

#![warn(clippy::unwrap_used)]

pub mod assignment;
pub mod recorder;
pub mod registry;
pub mod report;
pub mod segments;
pub mod significance;

pub use assignment::{assign_variant, AssignmentEngine};
pub use recorder::ExperimentRecorder;
pub use registry::ExperimentRegistry;
pub use report::ExperimentReport;
pub use segments::{DeviceClass, VisitorContext};
pub use significance::{evaluate, SignificanceResult};
