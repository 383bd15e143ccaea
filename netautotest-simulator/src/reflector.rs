//! Probe reflector with synthetic link conditions.
//!
//! Answers probe requests like a real responder, but every echo first passes
//! through a [`LinkImpairment`]: it may be dropped, or held back for the
//! planned delay. Held echoes are sent from their own task, so echoes can be
//! reordered just as on a real link.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use netautotest_core::time::unix_nanos;
use netautotest_protocols::probe::packet::MAX_PACKET_LEN;
use netautotest_protocols::ProbeParser;

use crate::network_simulation::LinkImpairment;

#[derive(Debug, Default)]
pub struct ReflectorStats {
    pub echoed: AtomicU64,
    pub dropped: AtomicU64,
}

pub struct ImpairedReflector {
    socket: Arc<UdpSocket>,
    link: Arc<LinkImpairment>,
    stats: Arc<ReflectorStats>,
}

impl ImpairedReflector {
    pub async fn bind(addr: SocketAddr, link: LinkImpairment) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            link: Arc::new(link),
            stats: Arc::new(ReflectorStats::default()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> Arc<ReflectorStats> {
        Arc::clone(&self.stats)
    }

    /// Serves until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let parser = ProbeParser::new();
        let mut buf = vec![0u8; MAX_PACKET_LEN];

        loop {
            let (len, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        debug!(error = %e, "Reflector receive failed");
                        continue;
                    }
                },
            };
            let reflect_ts = unix_nanos();

            let echo = match parser.answer(&buf[..len], reflect_ts) {
                Ok(Some(echo)) => echo.encode(),
                Ok(None) => continue,
                Err(e) => {
                    trace!(error = %e, %peer, "Dropping malformed datagram");
                    continue;
                }
            };

            let Some(delay) = self.link.plan() else {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let socket = Arc::clone(&self.socket);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if socket.send_to(&echo, peer).await.is_ok() {
                    stats.echoed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    }
}
