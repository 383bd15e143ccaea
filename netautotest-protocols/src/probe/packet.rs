//! ## netautotest-protocols::probe::packet
//! Fixed‑offset codec for the timestamped probe datagram.
//!
//! ```text
//!  0       4    5    6       8               16              24              32
//!  +-------+----+----+-------+---------------+---------------+---------------+-----
//!  | magic |ver |kind|  rsvd |   sequence    | send ts (ns)  | reflect ts(ns)| pad
//!  +-------+----+----+-------+---------------+---------------+---------------+-----
//! ```
//!
//! All integers are big endian. The send timestamp is an offset from the
//! initiator's session start; the reflect timestamp is the responder's wall
//! clock and is zero in requests.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"NATP";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 32;
/// Largest datagram that fits an Ethernet MTU without IP fragmentation.
pub const MAX_PACKET_LEN: usize = 1472;

/// Errors that can occur while parsing a probe datagram.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ProbeParseError {
    #[error("Insufficient data to parse probe packet ({0} bytes)")]
    InsufficientData(usize),
    #[error("Invalid probe magic")]
    BadMagic,
    #[error("Unsupported probe version {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown probe kind {0}")]
    UnknownKind(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProbeKind {
    Request = 1,
    Echo = 2,
}

impl TryFrom<u8> for ProbeKind {
    type Error = ProbeParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProbeKind::Request),
            2 => Ok(ProbeKind::Echo),
            other => Err(ProbeParseError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePacket {
    pub kind: ProbeKind,
    pub sequence: u64,
    pub send_ts_ns: u64,
    pub reflect_ts_ns: u64,
    /// Total datagram length including padding.
    pub len: usize,
}

impl ProbePacket {
    /// Builds a request padded to `len` bytes (clamped to the valid range).
    pub fn request(sequence: u64, send_ts_ns: u64, len: usize) -> Self {
        Self {
            kind: ProbeKind::Request,
            sequence,
            send_ts_ns,
            reflect_ts_ns: 0,
            len: len.clamp(HEADER_LEN, MAX_PACKET_LEN),
        }
    }

    /// Wraps a request into its echo. Sequence, send timestamp and length are
    /// carried over untouched.
    pub fn into_echo(self, reflect_ts_ns: u64) -> Self {
        Self {
            kind: ProbeKind::Echo,
            reflect_ts_ns,
            ..self
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len);
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.kind as u8);
        buf.put_u16(0);
        buf.put_u64(self.sequence);
        buf.put_u64(self.send_ts_ns);
        buf.put_u64(self.reflect_ts_ns);
        buf.resize(self.len.max(HEADER_LEN), 0);
        buf.freeze()
    }
}

/// Stateless probe parser.
#[derive(Default, Debug, Copy, Clone)]
pub struct ProbeParser;

impl ProbeParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, data: &[u8]) -> Result<ProbePacket, ProbeParseError> {
        if data.len() < HEADER_LEN {
            return Err(ProbeParseError::InsufficientData(data.len()));
        }

        let mut cursor = data;
        if cursor[..4] != MAGIC {
            return Err(ProbeParseError::BadMagic);
        }
        cursor.advance(4);

        let version = cursor.get_u8();
        if version != VERSION {
            return Err(ProbeParseError::UnsupportedVersion(version));
        }

        let kind = ProbeKind::try_from(cursor.get_u8())?;
        cursor.advance(2); // reserved

        Ok(ProbePacket {
            kind,
            sequence: cursor.get_u64(),
            send_ts_ns: cursor.get_u64(),
            reflect_ts_ns: cursor.get_u64(),
            len: data.len(),
        })
    }

    /// Parses a received datagram and builds the echo owed for it.
    ///
    /// Returns `Ok(None)` for well-formed datagrams that are not requests.
    pub fn answer(
        &self,
        data: &[u8],
        reflect_ts_ns: u64,
    ) -> Result<Option<ProbePacket>, ProbeParseError> {
        let packet = self.parse(data)?;
        Ok(match packet.kind {
            ProbeKind::Request => Some(packet.into_echo(reflect_ts_ns)),
            ProbeKind::Echo => None,
        })
    }
}
