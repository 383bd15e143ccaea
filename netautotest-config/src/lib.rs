//! # NetAutoTest Configuration System
//!
//! Hierarchical configuration for performance test campaigns.
//!
//! ## Features
//! - **Unified Configuration**: one document for topology, campaign, provisioner, reporting and telemetry
//! - **Validation**: range and cross-field checks before any network is touched
//! - **Environment Awareness**: per-environment overlay files and `NETAUTOTEST_*` overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

mod campaign;
mod error;
pub mod provider;
mod provisioner;
mod reporting;
mod telemetry;
mod topology;
mod validation;

pub use campaign::{
    CampaignSettings, FailurePolicy, PortsConfig, ProbeConfig, ThresholdSet, ThroughputToolConfig,
};
pub use error::ConfigError;
pub use provider::{ConfigProvider, FileProvider, LayeredProvider};
pub use provisioner::{ProvisionerBackend, ProvisionerConfig};
pub use reporting::ReportingConfig;
pub use telemetry::TelemetryConfig;
pub use topology::TopologyConfig;

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct NetAutoTestConfig {
    /// Emulated network shape and link parameters.
    #[validate(nested)]
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Iterations, durations, probe parameters and thresholds.
    #[validate(nested)]
    #[serde(default)]
    pub campaign: CampaignSettings,

    #[validate(nested)]
    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    #[validate(nested)]
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl NetAutoTestConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/netautotest.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<NETAUTOTEST_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `NETAUTOTEST_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&LayeredProvider::default())
    }

    /// Load configuration from a specific file, for campaigns run with `--config`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with(&FileProvider::new(path))
    }

    pub fn load_with(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        provider
            .load()?
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
