//! # NetAutoTest Protocols
//!
//! Wire formats spoken by the campaign engine. Currently the latency probe
//! protocol: a UDP request/echo exchange carrying sequence numbers and
//! timestamps.

pub mod probe;

pub use probe::{EchoOutcome, ProbePacket, ProbeParser, ProbeTracker};
