//! Observability configuration.
//!
//! Parameters for system instrumentation:
//! - Log verbosity
//! - Metrics text exposition

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log level; `RUST_LOG` takes precedence.
    #[validate(custom(function = validation::validate_log_level))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Publish per-unit metrics to the in-process registry.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Where to write the Prometheus text exposition after a campaign.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics: true,
            metrics_file: None,
        }
    }
}
