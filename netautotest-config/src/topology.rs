//! Emulated network parameters handed to the provisioner.

use serde::{Deserialize, Serialize};
use validator::Validate;

use netautotest_core::{TopologyKind, TopologySpec};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TopologyConfig {
    /// Shape of the network.
    #[serde(default = "default_kind")]
    pub kind: TopologyKind,

    /// Number of hosts; one server and at least one client.
    #[validate(range(min = 2, max = 254))]
    #[serde(default = "default_hosts")]
    pub hosts: u32,

    /// One-way link latency (ms).
    #[validate(range(max = 10_000))]
    #[serde(default = "default_latency")]
    pub latency_ms: u32,

    /// Link packet loss (%).
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_loss")]
    pub packet_loss: f64,

    /// Link bandwidth cap (Mbps); uncapped when unset.
    #[validate(range(min = 1))]
    #[serde(default = "default_bandwidth")]
    pub bandwidth_mbps: Option<u32>,

    #[validate(length(min = 1, max = 15))]
    #[serde(default = "default_switch")]
    pub switch_name: String,
}

fn default_kind() -> TopologyKind {
    TopologyKind::Star
}
fn default_hosts() -> u32 {
    4
}
fn default_latency() -> u32 {
    10
}
fn default_loss() -> f64 {
    0.1
}
fn default_bandwidth() -> Option<u32> {
    Some(100)
}
fn default_switch() -> String {
    "s1".into()
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            hosts: default_hosts(),
            latency_ms: default_latency(),
            packet_loss: default_loss(),
            bandwidth_mbps: default_bandwidth(),
            switch_name: default_switch(),
        }
    }
}

impl TopologyConfig {
    pub fn to_spec(&self) -> TopologySpec {
        TopologySpec {
            kind: self.kind,
            hosts: self.hosts,
            link_latency_ms: self.latency_ms,
            link_loss_percent: self.packet_loss,
            bandwidth_mbps: self.bandwidth_mbps,
            switch_name: self.switch_name.clone(),
        }
    }
}
