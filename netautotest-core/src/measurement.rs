//! ## netautotest-core::measurement
//! **Raw and aggregated measurement values**
//!
//! Probe samples are produced by the probe tracker, latency results are the
//! per-session aggregate, throughput results are returned verbatim by the
//! throughput adapter.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::stats;

/// Transport protocol exercised by a throughput session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped round trip. Times are offsets from the session start on a
/// monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSample {
    pub sequence_number: u64,
    pub send_time: Duration,
    pub receive_time: Option<Duration>,
}

impl ProbeSample {
    /// A probe whose echo never arrived within the deadline.
    pub fn lost(sequence_number: u64, send_time: Duration) -> Self {
        Self {
            sequence_number,
            send_time,
            receive_time: None,
        }
    }

    /// A probe whose echo was matched. Fails if the echo predates the send.
    pub fn received(
        sequence_number: u64,
        send_time: Duration,
        receive_time: Duration,
    ) -> Result<Self, CoreError> {
        if receive_time < send_time {
            return Err(CoreError::InvalidSessionConfig(format!(
                "probe {sequence_number} received before it was sent"
            )));
        }
        Ok(Self {
            sequence_number,
            send_time,
            receive_time: Some(receive_time),
        })
    }

    pub fn is_lost(&self) -> bool {
        self.receive_time.is_none()
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.receive_time.map(|r| r.saturating_sub(self.send_time))
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt().map(|rtt| rtt.as_secs_f64() * 1_000.0)
    }
}

/// RTT distribution of the received probes of one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttStats {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub std_ms: f64,
}

/// Aggregate of one latency session for one host-pair and iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyResult {
    /// `None` when no probe was answered.
    pub rtt: Option<RttStats>,
    /// Mean absolute RTT delta between consecutive received probes. `None`
    /// when no two consecutive probes were both received.
    pub jitter_ms: Option<f64>,
    pub packet_loss_percent: f64,
    pub samples_sent: u64,
    pub samples_received: u64,
    /// Received RTTs in send order.
    pub rtt_samples_ms: Vec<f64>,
}

impl LatencyResult {
    /// Closes a session. `samples` must be in send order.
    pub fn from_samples(samples: &[ProbeSample]) -> Result<Self, CoreError> {
        let samples_sent = samples.len() as u64;
        if samples_sent == 0 {
            return Err(CoreError::InvalidSessionConfig(
                "a latency session must send at least one probe".into(),
            ));
        }

        let rtts: Vec<Option<f64>> = samples.iter().map(ProbeSample::rtt_ms).collect();
        let received: Vec<f64> = rtts.iter().flatten().copied().collect();
        let samples_received = received.len() as u64;

        let rtt = stats::mean(&received).map(|mean_ms| RttStats {
            min_ms: received.iter().copied().fold(f64::INFINITY, f64::min),
            mean_ms,
            max_ms: received.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_ms: stats::sample_std_dev(&received),
        });

        Ok(Self {
            rtt,
            jitter_ms: stats::jitter(&rtts),
            packet_loss_percent: stats::loss_percent(samples_sent, samples_received)?,
            samples_sent,
            samples_received,
            rtt_samples_ms: received,
        })
    }

    pub fn rtt_mean_ms(&self) -> Option<f64> {
        self.rtt.map(|r| r.mean_ms)
    }
}

/// Structured result returned by the throughput adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub protocol: Protocol,
    pub throughput_mbps: f64,
    /// TCP only.
    pub retransmissions: Option<u64>,
    /// UDP only.
    pub jitter_ms: Option<f64>,
    /// UDP only.
    pub packet_loss_percent: Option<f64>,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn session(rtts: &[Option<u64>]) -> Vec<ProbeSample> {
        rtts.iter()
            .enumerate()
            .map(|(i, rtt)| {
                let send = ms(i as u64 * 1_000);
                match rtt {
                    Some(r) => ProbeSample::received(i as u64, send, send + ms(*r)).unwrap(),
                    None => ProbeSample::lost(i as u64, send),
                }
            })
            .collect()
    }

    #[test]
    fn test_jitter_over_consecutive_rtts() {
        let result =
            LatencyResult::from_samples(&session(&[Some(10), Some(12), Some(9), Some(15)]))
                .unwrap();
        let jitter = result.jitter_ms.unwrap();
        assert!((jitter - 11.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.samples_received, 4);
        assert_eq!(result.packet_loss_percent, 0.0);
    }

    #[test]
    fn test_lost_probe_breaks_jitter_pair() {
        // Pairs: (10,12) only; 12 -> lost -> 30 is not a pair.
        let result =
            LatencyResult::from_samples(&session(&[Some(10), Some(12), None, Some(30)])).unwrap();
        assert_eq!(result.jitter_ms, Some(2.0));
        assert_eq!(result.samples_sent, 4);
        assert_eq!(result.samples_received, 3);
        assert_eq!(result.packet_loss_percent, 25.0);
        let rtt = result.rtt.unwrap();
        assert_eq!(rtt.min_ms, 10.0);
        assert_eq!(rtt.max_ms, 30.0);
    }

    #[test]
    fn test_all_lost_has_no_rtt_statistics() {
        let result = LatencyResult::from_samples(&session(&[None, None])).unwrap();
        assert!(result.rtt.is_none());
        assert!(result.jitter_ms.is_none());
        assert_eq!(result.packet_loss_percent, 100.0);
    }

    #[test]
    fn test_zero_samples_is_a_config_error() {
        assert!(matches!(
            LatencyResult::from_samples(&[]),
            Err(CoreError::InvalidSessionConfig(_))
        ));
    }

    #[test]
    fn test_echo_before_send_is_rejected() {
        assert!(ProbeSample::received(1, ms(10), ms(5)).is_err());
    }

    #[test]
    fn test_protocol_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::Udp).unwrap(), "\"udp\"");
    }
}
