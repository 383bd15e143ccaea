//! ## netautotest-core::topology
//! **Topology description, provisioned endpoints and host-pair resolution**

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Shape of the emulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    /// Every host attached to one switch.
    Star,
    /// Hosts chained through one switch each.
    Line,
    /// Every host linked to every other host.
    Mesh,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopologyKind::Star => "star",
            TopologyKind::Line => "line",
            TopologyKind::Mesh => "mesh",
        };
        f.write_str(name)
    }
}

/// Parameters handed to the provisioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub kind: TopologyKind,
    pub hosts: u32,
    pub link_latency_ms: u32,
    pub link_loss_percent: f64,
    pub bandwidth_mbps: Option<u32>,
    pub switch_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Client,
    Server,
}

/// A reachable host inside a provisioned network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub address: IpAddr,
    pub role: EndpointRole,
    /// Command prefix that executes a program inside this host, e.g.
    /// `["ip", "netns", "exec", "h1"]`. Empty means the local host.
    #[serde(default)]
    pub exec_prefix: Vec<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: IpAddr, role: EndpointRole) -> Self {
        Self {
            name: name.into(),
            address,
            role,
            exec_prefix: Vec::new(),
        }
    }
}

/// A (client, server) tuple selected for one probe or throughput session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostPair {
    pub client: Endpoint,
    pub server: Endpoint,
}

impl HostPair {
    pub fn label(&self) -> String {
        format!("{}->{}", self.client.name, self.server.name)
    }

    /// Host names touched by this pair, sorted. Locks on hosts are always
    /// taken in this order.
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts = vec![self.client.name.as_str(), self.server.name.as_str()];
        hosts.sort_unstable();
        hosts.dedup();
        hosts
    }
}

impl fmt::Display for HostPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({})",
            self.client.name, self.client.address, self.server.name, self.server.address
        )
    }
}

/// Identifies a running network. Owned by the provisioner; the engine only
/// borrows it for the lifetime of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyHandle {
    pub id: String,
    pub endpoints: Vec<Endpoint>,
}

impl TopologyHandle {
    pub fn servers(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.role == EndpointRole::Server)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.role == EndpointRole::Client)
    }

    /// Pairs every client with a server, round-robin over the servers in
    /// declaration order. Empty if either side is missing.
    pub fn host_pairs(&self) -> Vec<HostPair> {
        let servers: Vec<&Endpoint> = self.servers().collect();
        if servers.is_empty() {
            return Vec::new();
        }
        self.clients()
            .enumerate()
            .map(|(i, client)| HostPair {
                client: client.clone(),
                server: servers[i % servers.len()].clone(),
            })
            .collect()
    }
}
