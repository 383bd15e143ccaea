//! ## netautotest-protocols::probe
//! **Timestamped probe protocol**
//!
//! The initiator sends requests at a fixed interval, each carrying a
//! monotonically increasing sequence number and its send timestamp. The
//! responder echoes every request back immediately. RTT is measured on the
//! initiator's clock only, so the two hosts do not need synchronized clocks.

pub mod packet;
pub mod tracker;

pub use packet::{ProbeKind, ProbePacket, ProbeParseError, ProbeParser, HEADER_LEN, MAX_PACKET_LEN};
pub use tracker::{EchoOutcome, ProbeTracker};
