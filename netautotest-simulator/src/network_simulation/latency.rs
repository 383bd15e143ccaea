//! One-way link delay.
//!
//! Every echo crossing an emulated link is held for the link's propagation
//! delay before the jitter model adds its share.

use std::time::Duration;

use netautotest_core::TopologySpec;

pub trait LatencyModel: Send + Sync {
    /// Delay added to one datagram crossing the link.
    fn link_delay(&self) -> Duration;
}

/// Constant propagation delay, as configured per link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLatencyModel {
    delay: Duration,
}

impl FixedLatencyModel {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Uses the topology's `link_latency_ms`.
    pub fn from_spec(spec: &TopologySpec) -> Self {
        Self::new(Duration::from_millis(u64::from(spec.link_latency_ms)))
    }
}

impl LatencyModel for FixedLatencyModel {
    #[inline]
    fn link_delay(&self) -> Duration {
        self.delay
    }
}

/// An ideal link.
#[derive(Debug, Clone, Copy)]
pub struct NoLatencyModel;

impl LatencyModel for NoLatencyModel {
    #[inline]
    fn link_delay(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netautotest_core::TopologyKind;

    #[test]
    fn test_delay_taken_from_topology() {
        let spec = TopologySpec {
            kind: TopologyKind::Line,
            hosts: 3,
            link_latency_ms: 25,
            link_loss_percent: 0.0,
            bandwidth_mbps: None,
            switch_name: "s1".into(),
        };
        assert_eq!(
            FixedLatencyModel::from_spec(&spec).link_delay(),
            Duration::from_millis(25)
        );
    }

    #[test]
    fn test_ideal_link_has_no_delay() {
        assert!(NoLatencyModel.link_delay().is_zero());
    }
}
