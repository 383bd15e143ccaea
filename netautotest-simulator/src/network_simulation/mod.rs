//! ## netautotest-simulator::network_simulation
//! **Synthetic link conditions for loopback dry runs**
//!
//! ### Key Submodules:
//! - `latency/`: fixed one-way delay
//! - `jitter/`: random extra delay
//! - `packet_loss/`: probabilistic drops
//!
//! [`LinkImpairment`] combines the three into one decision per datagram.

pub mod jitter;
pub mod latency;
pub mod packet_loss;

use std::time::Duration;

use netautotest_core::TopologySpec;

use jitter::{JitterModel, NoJitterModel, RandomJitterModel};
use latency::{FixedLatencyModel, LatencyModel, NoLatencyModel};
use packet_loss::{NoPacketLossModel, PacketLossModel, ProbabilisticLossModel};

/// Decides per datagram whether it is dropped and, if not, how long it is held.
pub struct LinkImpairment {
    latency: Box<dyn LatencyModel>,
    jitter: Box<dyn JitterModel>,
    loss: Box<dyn PacketLossModel>,
}

impl std::fmt::Debug for LinkImpairment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkImpairment").finish_non_exhaustive()
    }
}

impl Default for LinkImpairment {
    fn default() -> Self {
        Self::none()
    }
}

impl LinkImpairment {
    pub fn new(
        latency: Box<dyn LatencyModel>,
        jitter: Box<dyn JitterModel>,
        loss: Box<dyn PacketLossModel>,
    ) -> Self {
        Self {
            latency,
            jitter,
            loss,
        }
    }

    /// A perfect link.
    pub fn none() -> Self {
        Self::new(
            Box::new(NoLatencyModel),
            Box::new(NoJitterModel),
            Box::new(NoPacketLossModel),
        )
    }

    /// Link latency and loss from the topology, plus up to `jitter_ms` of
    /// random extra delay.
    pub fn from_spec(spec: &TopologySpec, jitter_ms: u64) -> Self {
        let jitter: Box<dyn JitterModel> = if jitter_ms == 0 {
            Box::new(NoJitterModel)
        } else {
            Box::new(RandomJitterModel::new(jitter_ms))
        };
        let loss: Box<dyn PacketLossModel> = if spec.link_loss_percent <= 0.0 {
            Box::new(NoPacketLossModel)
        } else {
            Box::new(ProbabilisticLossModel::new(spec.link_loss_percent / 100.0))
        };
        Self::new(
            Box::new(FixedLatencyModel::from_spec(spec)),
            jitter,
            loss,
        )
    }

    /// `None` drops the datagram, otherwise the delay before forwarding it.
    pub fn plan(&self) -> Option<Duration> {
        if self.loss.should_drop() {
            return None;
        }
        let delay = self.latency.link_delay();
        Some(self.jitter.apply_jitter(delay))
    }
}
