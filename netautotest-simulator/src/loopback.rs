//! Loopback provisioner.
//!
//! Emulates a topology without touching the host network: every host gets a
//! distinct `127.x.y.z` address, and every server host runs an
//! [`ImpairedReflector`] on the latency port that applies the topology's link
//! latency and loss. Throughput tools run on the local machine.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use netautotest_core::provision::Provisioner;
use netautotest_core::{
    Endpoint, EndpointRole, ProvisionError, TopologyHandle, TopologySpec,
};

use crate::network_simulation::LinkImpairment;
use crate::reflector::ImpairedReflector;

struct RunningHost {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct LoopbackProvisioner {
    latency_port: u16,
    base: Ipv4Addr,
    jitter_ms: u64,
    impaired: bool,
    next_id: AtomicU64,
    running: Mutex<HashMap<String, Vec<RunningHost>>>,
}

impl LoopbackProvisioner {
    /// Reflectors listen on `latency_port`; hosts start at `127.0.0.1`.
    pub fn new(latency_port: u16) -> Self {
        Self {
            latency_port,
            base: Ipv4Addr::new(127, 0, 0, 1),
            jitter_ms: 0,
            impaired: true,
            next_id: AtomicU64::new(1),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// First host address. Must lie in `127.0.0.0/8`.
    pub fn with_base(mut self, base: Ipv4Addr) -> Self {
        self.base = base;
        self
    }

    /// Up to `jitter_ms` of random extra delay per echo.
    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    /// Ignore the topology's link latency and loss.
    pub fn without_impairment(mut self) -> Self {
        self.impaired = false;
        self
    }

    fn host_address(&self, index: u32) -> Result<Ipv4Addr, ProvisionError> {
        let addr = u32::from(self.base)
            .checked_add(index)
            .map(Ipv4Addr::from)
            .filter(|a| a.is_loopback())
            .ok_or_else(|| {
                ProvisionError::InvalidTopology(format!(
                    "host {} does not fit in 127.0.0.0/8 from {}",
                    index + 1,
                    self.base
                ))
            })?;
        Ok(addr)
    }

    /// Number of handles currently provisioned.
    pub fn active(&self) -> usize {
        self.running.lock().len()
    }
}

#[async_trait]
impl Provisioner for LoopbackProvisioner {
    async fn provision(&self, spec: &TopologySpec) -> Result<TopologyHandle, ProvisionError> {
        if spec.hosts < 2 {
            return Err(ProvisionError::InvalidTopology(format!(
                "{} topology needs at least 2 hosts, got {}",
                spec.kind, spec.hosts
            )));
        }

        let id = format!("loopback-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut endpoints = Vec::with_capacity(spec.hosts as usize);
        let mut hosts = Vec::new();

        let addresses = (0..spec.hosts)
            .map(|index| self.host_address(index))
            .collect::<Result<Vec<_>, _>>()?;

        // h1 is the server, every other host a client.
        for (index, address) in addresses.into_iter().enumerate() {
            let role = if index == 0 {
                EndpointRole::Server
            } else {
                EndpointRole::Client
            };
            let endpoint = Endpoint::new(format!("h{}", index + 1), IpAddr::V4(address), role);

            if role == EndpointRole::Server {
                let link = if self.impaired {
                    LinkImpairment::from_spec(spec, self.jitter_ms)
                } else {
                    LinkImpairment::none()
                };
                let bind = SocketAddr::new(endpoint.address, self.latency_port);
                let reflector = match ImpairedReflector::bind(bind, link).await {
                    Ok(reflector) => reflector,
                    Err(e) => {
                        stop_hosts(hosts).await;
                        return Err(ProvisionError::Io(e));
                    }
                };
                let cancel = CancellationToken::new();
                let task = tokio::spawn(reflector.run(cancel.clone()));
                hosts.push(RunningHost { cancel, task });
                debug!(host = %endpoint.name, %bind, "Reflector started");
            }
            endpoints.push(endpoint);
        }

        self.running.lock().insert(id.clone(), hosts);
        info!(
            handle = %id,
            kind = %spec.kind,
            hosts = spec.hosts,
            "Loopback topology provisioned"
        );
        Ok(TopologyHandle { id, endpoints })
    }

    async fn release(&self, handle: &TopologyHandle) {
        let hosts = self.running.lock().remove(&handle.id);
        if let Some(hosts) = hosts {
            stop_hosts(hosts).await;
            info!(handle = %handle.id, "Loopback topology released");
        }
    }
}

async fn stop_hosts(hosts: Vec<RunningHost>) {
    for host in &hosts {
        host.cancel.cancel();
    }
    for host in hosts {
        let _ = host.task.await;
    }
}
