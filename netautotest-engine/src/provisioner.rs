//! External-command provisioner.
//!
//! `up` receives the topology through `NETAUTOTEST_*` environment variables
//! and prints the provisioned network on stdout as JSON, either a full
//! handle (`{"id": .., "endpoints": [..]}`) or a bare endpoint list. When no
//! endpoint states a role, the first one is the server and the rest are
//! clients. `down` is invoked with the handle id appended as its last
//! argument.

use std::collections::HashSet;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use netautotest_config::ProvisionerBackend;
use netautotest_core::provision::Provisioner;
use netautotest_core::{Endpoint, EndpointRole, ProvisionError, TopologyHandle, TopologySpec};

/// Endpoint as printed by `up`; the role may be left out.
#[derive(Deserialize)]
struct UpEndpoint {
    name: String,
    address: IpAddr,
    #[serde(default)]
    role: Option<EndpointRole>,
    #[serde(default)]
    exec_prefix: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UpOutput {
    Handle {
        id: String,
        endpoints: Vec<UpEndpoint>,
    },
    Endpoints(Vec<UpEndpoint>),
}

/// Resolves missing roles: with none stated, index 0 serves and the others
/// are clients; otherwise an endpoint without a role is a client.
fn resolve_roles(endpoints: Vec<UpEndpoint>) -> Vec<Endpoint> {
    let any_role = endpoints.iter().any(|e| e.role.is_some());
    endpoints
        .into_iter()
        .enumerate()
        .map(|(index, e)| {
            let role = match e.role {
                Some(role) => role,
                None if !any_role && index == 0 => EndpointRole::Server,
                None => EndpointRole::Client,
            };
            Endpoint {
                name: e.name,
                address: e.address,
                role,
                exec_prefix: e.exec_prefix,
            }
        })
        .collect()
}

pub struct CommandProvisioner {
    up: Vec<String>,
    down: Vec<String>,
    active: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl CommandProvisioner {
    pub fn new(up: Vec<String>, down: Vec<String>) -> Self {
        Self {
            up,
            down,
            active: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// `None` for backends that are not command based.
    pub fn from_backend(backend: &ProvisionerBackend) -> Option<Self> {
        match backend {
            ProvisionerBackend::Command { up, down } => Some(Self::new(up.clone(), down.clone())),
            ProvisionerBackend::Loopback => None,
        }
    }

    fn command(argv: &[String]) -> Result<Command, ProvisionError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProvisionError::Command("empty command".into()))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    fn parse_up(&self, stdout: &[u8]) -> Result<TopologyHandle, ProvisionError> {
        let output: UpOutput = serde_json::from_slice(stdout)
            .map_err(|e| ProvisionError::InvalidTopology(e.to_string()))?;
        let handle = match output {
            UpOutput::Handle { id, endpoints } => TopologyHandle {
                id,
                endpoints: resolve_roles(endpoints),
            },
            UpOutput::Endpoints(endpoints) => TopologyHandle {
                id: format!("cmd-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
                endpoints: resolve_roles(endpoints),
            },
        };
        if handle.endpoints.is_empty() {
            return Err(ProvisionError::InvalidTopology("no endpoints".into()));
        }
        Ok(handle)
    }
}

fn spec_env(spec: &TopologySpec) -> Vec<(&'static str, String)> {
    let mut env = vec![
        ("NETAUTOTEST_TOPOLOGY", spec.kind.to_string()),
        ("NETAUTOTEST_HOSTS", spec.hosts.to_string()),
        ("NETAUTOTEST_LINK_LATENCY_MS", spec.link_latency_ms.to_string()),
        ("NETAUTOTEST_LINK_LOSS_PERCENT", spec.link_loss_percent.to_string()),
        ("NETAUTOTEST_SWITCH", spec.switch_name.clone()),
    ];
    if let Some(bw) = spec.bandwidth_mbps {
        env.push(("NETAUTOTEST_BANDWIDTH_MBPS", bw.to_string()));
    }
    env
}

fn spawn_error(program: &str, err: std::io::Error) -> ProvisionError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ProvisionError::Command(format!("{program}: command not found"))
    } else {
        ProvisionError::Io(err)
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, spec: &TopologySpec) -> Result<TopologyHandle, ProvisionError> {
        let mut cmd = Self::command(&self.up)?;
        cmd.envs(spec_env(spec));
        debug!(command = ?self.up, "Running provisioner up command");

        let output = cmd
            .output()
            .await
            .map_err(|e| spawn_error(&self.up[0], e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Command(format!(
                "{} exited with {}: {}",
                self.up[0],
                output.status,
                stderr.trim()
            )));
        }

        let handle = self.parse_up(&output.stdout)?;
        self.active.lock().insert(handle.id.clone());
        info!(handle = %handle.id, endpoints = handle.endpoints.len(), "Command provisioner brought up network");
        Ok(handle)
    }

    async fn release(&self, handle: &TopologyHandle) {
        if !self.active.lock().remove(&handle.id) {
            debug!(handle = %handle.id, "Handle already released");
            return;
        }

        let mut argv = self.down.clone();
        argv.push(handle.id.clone());
        let mut cmd = match Self::command(&argv) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(handle = %handle.id, error = %e, "Cannot run provisioner down command");
                return;
            }
        };
        match cmd.output().await {
            Ok(output) if output.status.success() => {
                info!(handle = %handle.id, "Command provisioner tore down network");
            }
            Ok(output) => warn!(
                handle = %handle.id,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Provisioner down command failed"
            ),
            Err(e) => warn!(handle = %handle.id, error = %e, "Provisioner down command did not start"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netautotest_core::{EndpointRole, TopologyKind};

    fn spec(hosts: u32) -> TopologySpec {
        TopologySpec {
            kind: TopologyKind::Star,
            hosts,
            link_latency_ms: 10,
            link_loss_percent: 0.1,
            bandwidth_mbps: Some(100),
            switch_name: "s1".into(),
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    const ENDPOINTS: &str = r#"[{"name":"h1","address":"10.0.0.1","role":"server"},{"name":"h2","address":"10.0.0.2","role":"client"}]"#;

    #[tokio::test]
    async fn test_endpoint_list_gets_generated_id() {
        let up = sh(&format!(
            "test \"$NETAUTOTEST_HOSTS\" = 2 && test \"$NETAUTOTEST_TOPOLOGY\" = star && echo '{ENDPOINTS}'"
        ));
        let provisioner = CommandProvisioner::new(up, sh("true"));
        let handle = provisioner.provision(&spec(2)).await.unwrap();
        assert_eq!(handle.id, "cmd-1");
        assert_eq!(handle.endpoints.len(), 2);
        assert_eq!(handle.endpoints[0].role, EndpointRole::Server);
        assert_eq!(handle.host_pairs().len(), 1);
    }

    #[tokio::test]
    async fn test_endpoints_without_roles_use_first_as_server() {
        let up = sh(r#"echo '[{"name":"h1","address":"10.0.0.1"},{"name":"h2","address":"10.0.0.2"},{"name":"h3","address":"10.0.0.3"}]'"#);
        let provisioner = CommandProvisioner::new(up, sh("true"));
        let handle = provisioner.provision(&spec(3)).await.unwrap();

        let roles: Vec<EndpointRole> = handle.endpoints.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![EndpointRole::Server, EndpointRole::Client, EndpointRole::Client]
        );
        let labels: Vec<String> = handle.host_pairs().iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["h2->h1", "h3->h1"]);
    }

    #[tokio::test]
    async fn test_partial_roles_default_to_client() {
        let up = sh(r#"echo '{"id":"lab","endpoints":[{"name":"a","address":"10.0.0.1"},{"name":"b","address":"10.0.0.2","role":"server"}]}'"#);
        let provisioner = CommandProvisioner::new(up, sh("true"));
        let handle = provisioner.provision(&spec(2)).await.unwrap();
        assert_eq!(handle.endpoints[0].role, EndpointRole::Client);
        assert_eq!(handle.endpoints[1].role, EndpointRole::Server);
        assert_eq!(handle.host_pairs()[0].label(), "a->b");
    }

    #[tokio::test]
    async fn test_full_handle_is_accepted() {
        let up = sh(&format!("echo '{{\"id\":\"lab-7\",\"endpoints\":{ENDPOINTS}}}'"));
        let provisioner = CommandProvisioner::new(up, sh("true"));
        let handle = provisioner.provision(&spec(2)).await.unwrap();
        assert_eq!(handle.id, "lab-7");
    }

    #[tokio::test]
    async fn test_failing_up_command() {
        let provisioner = CommandProvisioner::new(sh("echo boom >&2; exit 3"), sh("true"));
        match provisioner.provision(&spec(2)).await {
            Err(ProvisionError::Command(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_output_is_invalid_topology() {
        let provisioner = CommandProvisioner::new(sh("echo not-json"), sh("true"));
        assert!(matches!(
            provisioner.provision(&spec(2)).await,
            Err(ProvisionError::InvalidTopology(_))
        ));

        let provisioner = CommandProvisioner::new(sh("echo '[]'"), sh("true"));
        assert!(matches!(
            provisioner.provision(&spec(2)).await,
            Err(ProvisionError::InvalidTopology(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let provisioner = CommandProvisioner::new(
            vec!["netautotest-no-such-provisioner".into()],
            sh("true"),
        );
        assert!(matches!(
            provisioner.provision(&spec(2)).await,
            Err(ProvisionError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_down_runs_once_with_handle_id() {
        let log = std::env::temp_dir().join(format!("netautotest-down-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&log);

        let provisioner = CommandProvisioner::new(
            sh(&format!("echo '{ENDPOINTS}'")),
            sh(&format!("echo \"$0\" >> {}", log.display())),
        );
        let handle = provisioner.provision(&spec(2)).await.unwrap();
        provisioner.release(&handle).await;
        provisioner.release(&handle).await;

        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), vec![handle.id.as_str()]);
        let _ = std::fs::remove_file(&log);
    }

    #[test]
    fn test_from_backend() {
        assert!(CommandProvisioner::from_backend(&ProvisionerBackend::Loopback).is_none());
        let backend = ProvisionerBackend::Command {
            up: vec!["up".into()],
            down: vec!["down".into()],
        };
        assert!(CommandProvisioner::from_backend(&backend).is_some());
    }
}
