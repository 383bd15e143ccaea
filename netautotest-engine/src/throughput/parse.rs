//! Parsers for iperf3 output: the `-J` JSON report first, plain text as a
//! fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use netautotest_core::{Protocol, ThroughputResult};

use crate::error::ThroughputToolError;

static BITRATE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([KMG]?)bits/sec").ok());

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    end: Option<End>,
}

#[derive(Debug, Default, Deserialize)]
struct End {
    #[serde(default)]
    sum_sent: Option<Sum>,
    #[serde(default)]
    sum_received: Option<Sum>,
    #[serde(default)]
    sum: Option<Sum>,
}

#[derive(Debug, Default, Deserialize)]
struct Sum {
    #[serde(default)]
    seconds: Option<f64>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    bits_per_second: Option<f64>,
    #[serde(default)]
    retransmits: Option<u64>,
    #[serde(default)]
    jitter_ms: Option<f64>,
    #[serde(default)]
    lost_percent: Option<f64>,
}

/// Parses tool output, JSON when it looks like JSON, text otherwise.
pub fn parse_output(
    protocol: Protocol,
    output: &str,
    duration_secs: f64,
) -> Result<ThroughputResult, ThroughputToolError> {
    if output.trim_start().starts_with('{') {
        parse_json(protocol, output, duration_secs)
    } else {
        parse_text(protocol, output, duration_secs)
    }
}

pub fn parse_json(
    protocol: Protocol,
    output: &str,
    duration_secs: f64,
) -> Result<ThroughputResult, ThroughputToolError> {
    let report: Report = serde_json::from_str(output)
        .map_err(|e| ThroughputToolError::Unparseable(format!("invalid JSON report: {e}")))?;
    if let Some(error) = report.error {
        return Err(ThroughputToolError::Unparseable(error));
    }
    let end = report
        .end
        .ok_or_else(|| ThroughputToolError::Unparseable("report has no `end` section".into()))?;

    match protocol {
        Protocol::Tcp => {
            let received = end.sum_received.ok_or_else(|| {
                ThroughputToolError::Unparseable("TCP report has no `sum_received`".into())
            })?;
            let sent = end.sum_sent.unwrap_or_default();
            let bps = received.bits_per_second.ok_or_else(|| {
                ThroughputToolError::Unparseable("missing `bits_per_second`".into())
            })?;
            Ok(ThroughputResult {
                protocol,
                throughput_mbps: bps / 1e6,
                retransmissions: Some(sent.retransmits.unwrap_or(0)),
                jitter_ms: None,
                packet_loss_percent: None,
                bytes_sent: sent.bytes,
                bytes_received: received.bytes,
                duration_secs: received.seconds.unwrap_or(duration_secs),
            })
        }
        Protocol::Udp => {
            let sum = end.sum.ok_or_else(|| {
                ThroughputToolError::Unparseable("UDP report has no `sum`".into())
            })?;
            let bps = sum.bits_per_second.ok_or_else(|| {
                ThroughputToolError::Unparseable("missing `bits_per_second`".into())
            })?;
            Ok(ThroughputResult {
                protocol,
                throughput_mbps: bps / 1e6,
                retransmissions: None,
                jitter_ms: sum.jitter_ms,
                packet_loss_percent: sum.lost_percent,
                bytes_sent: sum.bytes,
                bytes_received: sum.bytes,
                duration_secs: sum.seconds.unwrap_or(duration_secs),
            })
        }
    }
}

/// Takes the last `<value> [K|M|G]bits/sec` figure, which iperf3 prints on
/// its receiver summary line.
pub fn parse_text(
    protocol: Protocol,
    output: &str,
    duration_secs: f64,
) -> Result<ThroughputResult, ThroughputToolError> {
    let re = BITRATE
        .as_ref()
        .ok_or_else(|| ThroughputToolError::Unparseable("bitrate pattern unavailable".into()))?;

    let caps = re
        .captures_iter(output)
        .last()
        .ok_or_else(|| ThroughputToolError::Unparseable("no bitrate found in output".into()))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| ThroughputToolError::Unparseable(format!("bad bitrate {}", &caps[1])))?;
    let mbps = match caps[2].to_ascii_uppercase().as_str() {
        "G" => value * 1_000.0,
        "M" => value,
        "K" => value / 1_000.0,
        _ => value / 1e6,
    };

    Ok(ThroughputResult {
        protocol,
        throughput_mbps: mbps,
        retransmissions: None,
        jitter_ms: None,
        packet_loss_percent: None,
        bytes_sent: None,
        bytes_received: None,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_REPORT: &str = r#"{
        "start": {},
        "intervals": [],
        "end": {
            "sum_sent": { "seconds": 10.0, "bytes": 118358016, "bits_per_second": 94686412.8, "retransmits": 7 },
            "sum_received": { "seconds": 10.04, "bytes": 117964800, "bits_per_second": 93995856.0 }
        }
    }"#;

    const UDP_REPORT: &str = r#"{
        "end": {
            "sum": { "seconds": 10.0, "bytes": 13107200, "bits_per_second": 10485760.0,
                     "jitter_ms": 0.042, "lost_packets": 3, "lost_percent": 0.33 }
        }
    }"#;

    #[test]
    fn test_tcp_json() {
        let result = parse_output(Protocol::Tcp, TCP_REPORT, 10.0).unwrap();
        assert!((result.throughput_mbps - 93.995856).abs() < 1e-9);
        assert_eq!(result.retransmissions, Some(7));
        assert_eq!(result.bytes_sent, Some(118358016));
        assert_eq!(result.bytes_received, Some(117964800));
        assert_eq!(result.jitter_ms, None);
        assert_eq!(result.duration_secs, 10.04);
    }

    #[test]
    fn test_udp_json() {
        let result = parse_output(Protocol::Udp, UDP_REPORT, 10.0).unwrap();
        assert!((result.throughput_mbps - 10.48576).abs() < 1e-9);
        assert_eq!(result.jitter_ms, Some(0.042));
        assert_eq!(result.packet_loss_percent, Some(0.33));
        assert_eq!(result.retransmissions, None);
    }

    #[test]
    fn test_error_field_is_unparseable() {
        let err = parse_output(
            Protocol::Tcp,
            r#"{"start": {}, "error": "unable to connect to server: Connection refused"}"#,
            10.0,
        )
        .unwrap_err();
        match err {
            ThroughputToolError::Unparseable(msg) => assert!(msg.contains("Connection refused")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_protocol_section_missing() {
        assert!(parse_json(Protocol::Udp, TCP_REPORT, 10.0).is_err());
    }

    #[test]
    fn test_text_fallback_uses_receiver_line() {
        let output = "\
[ ID] Interval           Transfer     Bitrate         Retr
[  5]   0.00-10.00  sec   113 MBytes  94.7 Mbits/sec    7             sender
[  5]   0.00-10.04  sec   112 MBytes  94.0 Mbits/sec                  receiver
";
        let result = parse_output(Protocol::Tcp, output, 10.0).unwrap();
        assert_eq!(result.throughput_mbps, 94.0);
        assert_eq!(result.duration_secs, 10.0);
    }

    #[test]
    fn test_text_units() {
        let gbit = parse_text(Protocol::Tcp, "1.5 Gbits/sec", 1.0).unwrap();
        assert_eq!(gbit.throughput_mbps, 1_500.0);
        let kbit = parse_text(Protocol::Tcp, "800 Kbits/sec", 1.0).unwrap();
        assert!((kbit.throughput_mbps - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_text_without_bitrate() {
        assert!(matches!(
            parse_text(Protocol::Tcp, "iperf3: error - unable to connect", 1.0),
            Err(ThroughputToolError::Unparseable(_))
        ));
    }
}
