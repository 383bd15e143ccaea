//! # netautotest-engine
//!
//! Runs performance test campaigns: provisions a network, drives latency
//! probes and throughput sessions over its host-pairs, scores the results
//! against thresholds and hands the run to report renderers.
//!
//! ### Key Submodules:
//! - `campaign`: orchestrator state machine and run record
//! - `prober`: UDP latency prober
//! - `responder`: echo responder for the server side of a probe session
//! - `throughput`: external throughput tool adapter (iperf3)
//! - `evaluator`: aggregation and threshold verdicts
//! - `provisioner`: external-command provisioner
//! - `report`: report renderers

pub mod campaign;
pub mod error;
pub mod evaluator;
pub mod prober;
pub mod provisioner;
pub mod record;
pub mod report;
pub mod responder;
pub mod throughput;

pub use campaign::{
    CampaignAborted, CampaignOrchestrator, CampaignRun, CampaignState, NetworkLease,
    StateTransition,
};
pub use error::{CampaignError, ProbeError, ThroughputToolError};
pub use evaluator::{aggregate, evaluate, CampaignVerdict, MetricObservation, MetricVerdict};
pub use prober::{LatencyProbe, ProbeSession, SourceBinding, UdpLatencyProber};
pub use provisioner::CommandProvisioner;
pub use report::{JsonReportRenderer, ReportError, ReportRenderer};
pub use responder::EchoResponder;
pub use throughput::{Iperf3Tool, ThroughputRequest, ThroughputTool};
