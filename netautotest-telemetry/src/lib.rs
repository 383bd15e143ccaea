//! # NetAutoTest Telemetry
//!
//! Crate for logging and metrics of test campaigns.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricsRecorder, UnitOutcome};
