//! # netautotest-core
//!
//! Foundation layer for the performance test campaign engine: the data model
//! shared by every other crate, the error taxonomy, and the pure statistics
//! that turn probe samples into latency results.
//!
//! ### Key Submodules:
//! - `measurement`: probe samples, latency and throughput results
//! - `stats`: RTT aggregation, jitter and loss computation
//! - `time`: drift-free probe send schedule
//! - `topology`: topology spec, endpoints, host-pair resolution
//! - `provision`: the provisioner contract (external collaborator)

pub mod error;
pub mod measurement;
pub mod provision;
pub mod stats;
pub mod time;
pub mod topology;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::measurement::*;
    pub use crate::provision::*;
    pub use crate::time::*;
    pub use crate::topology::*;
}

pub use error::{CoreError, ProvisionError};
pub use measurement::{LatencyResult, ProbeSample, Protocol, ThroughputResult};
pub use topology::{Endpoint, EndpointRole, HostPair, TopologyHandle, TopologyKind, TopologySpec};
