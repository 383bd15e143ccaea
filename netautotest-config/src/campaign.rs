//! Campaign settings: iterations, probe parameters, ports and thresholds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use netautotest_core::Protocol;

use crate::validation;

/// What the orchestrator does with a host-pair after one of its units failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep probing the pair in later iterations.
    #[default]
    Continue,
    /// Skip the pair for the rest of the campaign.
    SkipPairAfterFailure,
}

/// Test campaign parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_campaign))]
pub struct CampaignSettings {
    /// Length of each latency and throughput session (seconds).
    #[validate(range(min = 1, max = 86_400))]
    #[serde(default = "default_duration")]
    pub duration_seconds: u64,

    /// Number of iterations over all host-pairs.
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Pause between two iterations (seconds).
    #[validate(range(max = 86_400))]
    #[serde(default = "default_delay")]
    pub delay_between_iterations: u64,

    /// Throughput protocols, run once each per iteration and host-pair.
    #[validate(length(min = 1))]
    #[validate(custom(function = validation::validate_protocols))]
    #[serde(default = "default_protocols")]
    pub protocols: Vec<Protocol>,

    #[validate(nested)]
    #[serde(default)]
    pub ports: PortsConfig,

    #[validate(nested)]
    #[serde(default)]
    pub probe: ProbeConfig,

    #[validate(nested)]
    #[serde(default)]
    pub thresholds: ThresholdSet,

    #[validate(nested)]
    #[serde(default)]
    pub throughput: ThroughputToolConfig,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Upper bound on host-pairs probed concurrently within an iteration.
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_parallel_pairs")]
    pub max_parallel_pairs: usize,
}

fn default_duration() -> u64 {
    60
}
fn default_iterations() -> u32 {
    5
}
fn default_delay() -> u64 {
    10
}
fn default_protocols() -> Vec<Protocol> {
    vec![Protocol::Tcp]
}
fn default_parallel_pairs() -> usize {
    num_cpus::get()
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            duration_seconds: default_duration(),
            iterations: default_iterations(),
            delay_between_iterations: default_delay(),
            protocols: default_protocols(),
            ports: PortsConfig::default(),
            probe: ProbeConfig::default(),
            thresholds: ThresholdSet::default(),
            throughput: ThroughputToolConfig::default(),
            failure_policy: FailurePolicy::default(),
            max_parallel_pairs: default_parallel_pairs(),
        }
    }
}

impl CampaignSettings {
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_secs(self.delay_between_iterations)
    }
}

/// Ports used on the server side of each host-pair.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct PortsConfig {
    #[validate(range(min = 1))]
    pub tcp: u16,
    #[validate(range(min = 1))]
    pub udp: u16,
    #[validate(range(min = 1))]
    pub latency: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            tcp: 5001,
            udp: 5002,
            latency: 5003,
        }
    }
}

impl PortsConfig {
    pub fn for_protocol(&self, protocol: Protocol) -> u16 {
        match protocol {
            Protocol::Tcp => self.tcp,
            Protocol::Udp => self.udp,
        }
    }
}

/// Latency probe parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Interval between two probes (milliseconds).
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Datagram size including the 32‑byte header.
    #[validate(range(min = 32, max = 1472))]
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// A probe unanswered after this many intervals is lost.
    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_loss_deadline")]
    pub loss_deadline_intervals: u32,
}

fn default_interval_ms() -> u64 {
    1_000
}
fn default_packet_size() -> usize {
    64
}
fn default_loss_deadline() -> u32 {
    3
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            packet_size: default_packet_size(),
            loss_deadline_intervals: default_loss_deadline(),
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn loss_deadline(&self) -> Duration {
        self.interval() * self.loss_deadline_intervals
    }
}

/// Pass/fail limits. An unset limit is not evaluated.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ThresholdSet {
    /// Upper bound on the campaign mean RTT (ms).
    #[validate(range(min = 0.0))]
    pub max_latency_ms: Option<f64>,

    /// Upper bound on the campaign mean packet loss (%).
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_packet_loss_percent: Option<f64>,

    /// Upper bound on the campaign mean jitter (ms).
    #[validate(range(min = 0.0))]
    pub max_jitter_ms: Option<f64>,

    /// Lower bound on the campaign mean throughput (Mbps).
    #[validate(range(min = 0.0))]
    pub min_throughput_mbps: Option<f64>,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            max_latency_ms: Some(50.0),
            max_packet_loss_percent: Some(1.0),
            max_jitter_ms: None,
            min_throughput_mbps: Some(10.0),
        }
    }
}

/// External throughput tool invocation.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ThroughputToolConfig {
    /// Executable name or path.
    #[validate(length(min = 1))]
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Grace period on top of the session duration before the tool is killed (seconds).
    #[validate(range(min = 1, max = 3_600))]
    #[serde(default = "default_margin")]
    pub timeout_margin_secs: u64,

    /// Time given to the server to start listening (milliseconds).
    #[validate(range(max = 60_000))]
    #[serde(default = "default_startup")]
    pub server_startup_ms: u64,

    /// UDP target bitrate passed to the tool, e.g. `"10M"`.
    #[serde(default)]
    pub udp_bitrate: Option<String>,
}

fn default_binary() -> String {
    "iperf3".into()
}
fn default_margin() -> u64 {
    10
}
fn default_startup() -> u64 {
    1_000
}

impl Default for ThroughputToolConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_margin_secs: default_margin(),
            server_startup_ms: default_startup(),
            udp_bitrate: None,
        }
    }
}
