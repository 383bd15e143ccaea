use std::time::Duration;

use thiserror::Error;

use netautotest_config::ConfigError;
use netautotest_core::{CoreError, ProvisionError};

/// Failure of one latency session.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Invalid probe session: {0}")]
    InvalidSession(#[from] CoreError),

    #[error("Probe session interrupted")]
    Interrupted,
}

/// Failure of one throughput tool invocation.
#[derive(Debug, Error)]
pub enum ThroughputToolError {
    #[error("Throughput tool not found: {0}")]
    NotFound(String),

    #[error("Throughput tool exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Unparseable throughput tool output: {0}")]
    Unparseable(String),

    #[error("Throughput tool did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Throughput tool I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Throughput session interrupted")]
    Interrupted,
}

/// Infrastructure failures that abort a campaign.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Provisioned network has no usable host-pairs")]
    NoHostPairs,
}
