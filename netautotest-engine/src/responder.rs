//! Echo responder: the server half of the probe protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use netautotest_core::time::unix_nanos;
use netautotest_protocols::probe::MAX_PACKET_LEN;
use netautotest_protocols::ProbeParser;

/// Bytes of a malformed datagram included in its trace dump.
const DUMP_LIMIT: usize = 64;

pub struct EchoResponder {
    socket: UdpSocket,
    echoed: Arc<AtomicU64>,
}

impl EchoResponder {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            echoed: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Shared counter of echoed requests.
    pub fn echoed(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.echoed)
    }

    /// Answers requests until `cancel` fires and returns the number echoed.
    #[instrument(skip_all, fields(addr = ?self.socket.local_addr().ok()))]
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let parser = ProbeParser::new();
        let mut buf = vec![0u8; MAX_PACKET_LEN];
        info!("Echo responder listening");

        loop {
            let (len, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        debug!(error = %e, "Receive failed");
                        continue;
                    }
                },
            };
            let reflect_ts = unix_nanos();

            let echo = match parser.answer(&buf[..len], reflect_ts) {
                Ok(Some(echo)) => echo,
                Ok(None) => {
                    trace!(%peer, "Ignoring non-request probe");
                    continue;
                }
                Err(e) => {
                    trace!(
                        %peer,
                        error = %e,
                        dump = %hex::encode(&buf[..len.min(DUMP_LIMIT)]),
                        "Dropping malformed datagram"
                    );
                    continue;
                }
            };

            match self.socket.send_to(&echo.encode(), peer).await {
                Ok(_) => {
                    self.echoed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(%peer, error = %e, "Echo send failed"),
            }
        }

        let echoed = self.echoed.load(Ordering::Relaxed);
        info!(echoed, "Echo responder stopped");
        echoed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netautotest_protocols::probe::ProbeKind;
    use netautotest_protocols::ProbePacket;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_echo_and_malformed_dump() {
        let responder = EchoResponder::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = responder.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(responder.run(cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[0xde, 0xad, 0xbe, 0xef], addr).await.unwrap();
        let request = ProbePacket::request(11, 99, 200);
        client.send_to(&request.encode(), addr).await.unwrap();

        let mut buf = [0u8; MAX_PACKET_LEN];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(len, 200);
        let echo = ProbeParser::new().parse(&buf[..len]).unwrap();
        assert_eq!(echo.kind, ProbeKind::Echo);
        assert_eq!(echo.sequence, 11);
        assert_eq!(echo.send_ts_ns, 99);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 1);
        assert!(logs_contain("deadbeef"));
    }
}
