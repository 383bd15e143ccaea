//! Throughput adapter.
//!
//! The engine never generates bulk traffic itself; it drives an external
//! tool through [`ThroughputTool`] and receives a structured
//! [`ThroughputResult`]. Failed invocations are not retried.

mod iperf3;
pub mod parse;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use netautotest_core::{HostPair, Protocol, ThroughputResult};

use crate::error::ThroughputToolError;

pub use iperf3::Iperf3Tool;

/// One throughput measurement between a host-pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputRequest {
    pub protocol: Protocol,
    pub duration: Duration,
    pub port: u16,
}

#[async_trait]
pub trait ThroughputTool: Send + Sync {
    async fn measure(
        &self,
        pair: &HostPair,
        request: &ThroughputRequest,
        cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ThroughputToolError>;
}
