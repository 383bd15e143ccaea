//! iperf3 driver.
//!
//! Each measurement starts a one-shot server on the server endpoint, gives
//! it a moment to listen, runs the client with `-J` on the client endpoint
//! and always stops the server afterwards. Endpoint command prefixes (such as
//! `ip netns exec h1`) are prepended to both invocations.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use netautotest_config::ThroughputToolConfig;
use netautotest_core::{Endpoint, HostPair, Protocol, ThroughputResult};

use super::parse::parse_output;
use super::{ThroughputRequest, ThroughputTool};
use crate::error::ThroughputToolError;

#[derive(Debug, Clone)]
pub struct Iperf3Tool {
    binary: String,
    timeout_margin: Duration,
    server_startup: Duration,
    udp_bitrate: Option<String>,
}

impl Iperf3Tool {
    pub fn new(config: &ThroughputToolConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout_margin: Duration::from_secs(config.timeout_margin_secs),
            server_startup: Duration::from_millis(config.server_startup_ms),
            udp_bitrate: config.udp_bitrate.clone(),
        }
    }

    pub fn server_args(&self, request: &ThroughputRequest) -> Vec<String> {
        vec![
            "-s".into(),
            "-p".into(),
            request.port.to_string(),
            "-1".into(),
        ]
    }

    pub fn client_args(&self, server: &Endpoint, request: &ThroughputRequest) -> Vec<String> {
        let mut args = vec![
            "-c".into(),
            server.address.to_string(),
            "-p".into(),
            request.port.to_string(),
            "-t".into(),
            request.duration.as_secs().max(1).to_string(),
            "-J".into(),
        ];
        if request.protocol == Protocol::Udp {
            args.push("-u".into());
            if let Some(bitrate) = &self.udp_bitrate {
                args.push("-b".into());
                args.push(bitrate.clone());
            }
        }
        args
    }

    fn command(&self, endpoint: &Endpoint, args: &[String]) -> Command {
        let mut cmd = match endpoint.exec_prefix.split_first() {
            Some((program, prefix_args)) => {
                let mut cmd = Command::new(program);
                cmd.args(prefix_args).arg(&self.binary);
                cmd
            }
            None => Command::new(&self.binary),
        };
        cmd.args(args).kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ThroughputToolError {
        if e.kind() == ErrorKind::NotFound {
            ThroughputToolError::NotFound(self.binary.clone())
        } else {
            ThroughputToolError::Io(e)
        }
    }

    async fn run_client(
        &self,
        pair: &HostPair,
        request: &ThroughputRequest,
        cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ThroughputToolError> {
        let limit = request.duration + self.timeout_margin;
        let client = self
            .command(&pair.client, &self.client_args(&pair.server, request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ThroughputToolError::Interrupted),
            output = tokio::time::timeout(limit, client.wait_with_output()) => match output {
                Ok(output) => output?,
                Err(_) => return Err(ThroughputToolError::Timeout(limit)),
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // With -J iperf3 reports its own errors on stdout.
            let stderr = if stderr.is_empty() {
                stdout.trim().to_string()
            } else {
                stderr
            };
            return Err(ThroughputToolError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        parse_output(request.protocol, &stdout, request.duration.as_secs_f64())
    }
}

async fn stop_server(mut server: Child) {
    if let Err(e) = server.start_kill() {
        // Already exited after its single test.
        debug!(error = %e, "Server kill skipped");
    }
    if let Err(e) = server.wait().await {
        warn!(error = %e, "Failed to reap iperf3 server");
    }
}

#[async_trait]
impl ThroughputTool for Iperf3Tool {
    #[instrument(skip_all, fields(pair = %pair.label(), protocol = %request.protocol))]
    async fn measure(
        &self,
        pair: &HostPair,
        request: &ThroughputRequest,
        cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ThroughputToolError> {
        let server = self
            .command(&pair.server, &self.server_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.server_startup) => true,
        };
        let result = if started {
            self.run_client(pair, request, cancel).await
        } else {
            Err(ThroughputToolError::Interrupted)
        };

        stop_server(server).await;

        if let Ok(result) = &result {
            debug!(mbps = result.throughput_mbps, "Throughput measured");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netautotest_core::EndpointRole;
    use std::net::{IpAddr, Ipv4Addr};

    fn tool(binary: &str) -> Iperf3Tool {
        Iperf3Tool::new(&ThroughputToolConfig {
            binary: binary.into(),
            timeout_margin_secs: 1,
            server_startup_ms: 0,
            udp_bitrate: Some("20M".into()),
        })
    }

    fn pair() -> HostPair {
        HostPair {
            client: Endpoint::new("h2", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), EndpointRole::Client),
            server: Endpoint::new("h1", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), EndpointRole::Server),
        }
    }

    fn request(protocol: Protocol) -> ThroughputRequest {
        ThroughputRequest {
            protocol,
            duration: Duration::from_secs(5),
            port: 5002,
        }
    }

    #[test]
    fn test_command_lines() {
        let tool = tool("iperf3");
        assert_eq!(tool.server_args(&request(Protocol::Tcp)), ["-s", "-p", "5002", "-1"]);
        assert_eq!(
            tool.client_args(&pair().server, &request(Protocol::Tcp)),
            ["-c", "10.0.0.1", "-p", "5002", "-t", "5", "-J"]
        );
        assert_eq!(
            tool.client_args(&pair().server, &request(Protocol::Udp)),
            ["-c", "10.0.0.1", "-p", "5002", "-t", "5", "-J", "-u", "-b", "20M"]
        );
    }

    #[test]
    fn test_exec_prefix_wraps_binary() {
        let tool = tool("iperf3");
        let mut server = pair().server;
        server.exec_prefix = vec!["ip".into(), "netns".into(), "exec".into(), "h1".into()];
        let cmd = tool.command(&server, &["-s".to_string()]);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "ip");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["netns", "exec", "h1", "iperf3", "-s"]);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = tool("netautotest-no-such-iperf3")
            .measure(&pair(), &request(Protocol::Tcp), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputToolError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit() {
        // `false` ignores its arguments and exits with status 1.
        let err = tool("false")
            .measure(&pair(), &request(Protocol::Tcp), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputToolError::NonZeroExit { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unparseable_output() {
        // `echo` prints its arguments and succeeds; there is no bitrate in them.
        let err = tool("echo")
            .measure(&pair(), &request(Protocol::Tcp), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputToolError::Unparseable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_before_client() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tool("true")
            .measure(&pair(), &request(Protocol::Tcp), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ThroughputToolError::Interrupted));
    }
}
