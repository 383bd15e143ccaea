//! Per-unit records collected while a campaign runs.
//!
//! A unit of work is one latency session or one throughput invocation for a
//! given iteration and host-pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use netautotest_core::{LatencyResult, Protocol, ThroughputResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "unit", content = "protocol", rename_all = "snake_case")]
pub enum UnitKind {
    Latency,
    Throughput(Protocol),
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Latency => f.write_str("latency"),
            UnitKind::Throughput(protocol) => write!(f, "throughput/{protocol}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub iteration: u32,
    pub pair: String,
    pub result: LatencyResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputRecord {
    pub iteration: u32,
    pub pair: String,
    pub result: ThroughputResult,
}

/// A unit that ended in an error. The campaign carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub iteration: u32,
    pub pair: String,
    pub kind: UnitKind,
    pub error: String,
}

/// A unit cut short by a stop request. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptedUnit {
    pub iteration: u32,
    pub pair: String,
    pub kind: UnitKind,
}
