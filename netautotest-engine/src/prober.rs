//! Latency prober: the initiator side of the probe protocol.
//!
//! One session sends probes on a drift-free schedule while collecting echoes
//! on the same socket, then waits for outstanding probes until they are
//! answered or their loss deadline passes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use netautotest_config::CampaignSettings;
use netautotest_core::time::SendSchedule;
use netautotest_core::{HostPair, LatencyResult};
use netautotest_protocols::probe::{ProbeKind, MAX_PACKET_LEN};
use netautotest_protocols::{EchoOutcome, ProbePacket, ProbeParser, ProbeTracker};

use crate::error::ProbeError;

/// Parameters of one latency session.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSession {
    pub duration: Duration,
    pub interval: Duration,
    pub packet_size: usize,
    pub loss_deadline: Duration,
    pub port: u16,
}

impl ProbeSession {
    pub fn from_settings(settings: &CampaignSettings) -> Self {
        Self {
            duration: settings.session_duration(),
            interval: settings.probe.interval(),
            packet_size: settings.probe.packet_size,
            loss_deadline: settings.probe.loss_deadline(),
            port: settings.ports.latency,
        }
    }
}

#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Runs one session from `pair.client` to `pair.server`.
    async fn run(
        &self,
        pair: &HostPair,
        session: &ProbeSession,
        cancel: &CancellationToken,
    ) -> Result<LatencyResult, ProbeError>;
}

/// Local address the probe socket is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceBinding {
    /// Let the OS pick the source address.
    #[default]
    Unspecified,
    /// Send from the client endpoint's address.
    ClientAddress,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UdpLatencyProber {
    source: SourceBinding,
}

impl UdpLatencyProber {
    pub fn new(source: SourceBinding) -> Self {
        Self { source }
    }

    fn local_addr(&self, pair: &HostPair) -> SocketAddr {
        let ip = match (self.source, pair.server.address) {
            (SourceBinding::ClientAddress, _) => pair.client.address,
            (SourceBinding::Unspecified, IpAddr::V4(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (SourceBinding::Unspecified, IpAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        SocketAddr::new(ip, 0)
    }
}

#[async_trait]
impl LatencyProbe for UdpLatencyProber {
    #[instrument(skip_all, fields(pair = %pair.label()))]
    async fn run(
        &self,
        pair: &HostPair,
        session: &ProbeSession,
        cancel: &CancellationToken,
    ) -> Result<LatencyResult, ProbeError> {
        let schedule = SendSchedule::new(session.duration, session.interval)?;
        let target = SocketAddr::new(pair.server.address, session.port);

        let socket = UdpSocket::bind(self.local_addr(pair)).await?;
        socket.connect(target).await?;
        debug!(%target, probes = schedule.len(), "Latency session started");

        let parser = ProbeParser::new();
        let mut tracker = ProbeTracker::new(session.loss_deadline);
        let mut buf = vec![0u8; MAX_PACKET_LEN];
        let mut next = 0u64;
        let start = Instant::now();

        loop {
            let next_send = schedule.offset(next);
            let wake_at = match (next_send, tracker.outstanding_deadline()) {
                (Some(offset), _) => start + offset,
                (None, Some(deadline)) => start + deadline,
                (None, None) => break,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProbeError::Interrupted),
                _ = sleep_until(wake_at) => {
                    if next_send.is_none() {
                        // Every unanswered probe is now past its deadline.
                        break;
                    }
                    let send_time = start.elapsed();
                    let seq = tracker.on_send(send_time);
                    let packet = ProbePacket::request(seq, send_time.as_nanos() as u64, session.packet_size);
                    if let Err(e) = socket.send(&packet.encode()).await {
                        if seq == 0 {
                            return Err(ProbeError::Transport(e));
                        }
                        debug!(seq, error = %e, "Probe send failed, counting as lost");
                    }
                    next += 1;
                }
                received = socket.recv(&mut buf) => {
                    let receive_time = start.elapsed();
                    match received.map(|len| parser.parse(&buf[..len])) {
                        Ok(Ok(echo)) if echo.kind == ProbeKind::Echo => {
                            let outcome = tracker.on_echo(echo.sequence, echo.send_ts_ns, receive_time);
                            if !matches!(outcome, EchoOutcome::Matched(_)) {
                                trace!(seq = echo.sequence, ?outcome, "Echo ignored");
                            }
                        }
                        Ok(Ok(other)) => trace!(kind = ?other.kind, "Ignoring non-echo datagram"),
                        Ok(Err(e)) => trace!(error = %e, "Ignoring malformed datagram"),
                        // ICMP errors from an unreachable responder surface here.
                        Err(e) => trace!(error = %e, "Receive failed"),
                    }
                }
            }
        }

        let result = LatencyResult::from_samples(&tracker.finish())?;
        debug!(
            sent = result.samples_sent,
            received = result.samples_received,
            rtt_mean_ms = ?result.rtt_mean_ms(),
            "Latency session finished"
        );
        Ok(result)
    }
}
