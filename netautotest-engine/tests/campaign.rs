use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use netautotest_config::{FailurePolicy, NetAutoTestConfig};
use netautotest_core::provision::Provisioner;
use netautotest_core::{
    Endpoint, EndpointRole, HostPair, LatencyResult, ProbeSample, ProvisionError,
    ThroughputResult, TopologyHandle, TopologySpec,
};
use netautotest_engine::evaluator::Metric;
use netautotest_engine::record::UnitKind;
use netautotest_engine::report::{ReportError, ReportRenderer};
use netautotest_engine::{
    CampaignError, CampaignOrchestrator, CampaignRun, CampaignState, LatencyProbe, ProbeError,
    ProbeSession, ThroughputRequest, ThroughputTool, ThroughputToolError,
};

fn endpoint(name: &str, last: u8, role: EndpointRole) -> Endpoint {
    Endpoint::new(name, IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), role)
}

fn star(clients: u8) -> Vec<Endpoint> {
    let mut endpoints = vec![endpoint("h1", 1, EndpointRole::Server)];
    for i in 0..clients {
        endpoints.push(endpoint(&format!("h{}", i + 2), i + 2, EndpointRole::Client));
    }
    endpoints
}

fn config(iterations: u32) -> NetAutoTestConfig {
    let mut config = NetAutoTestConfig::default();
    config.campaign.iterations = iterations;
    config.campaign.duration_seconds = 1;
    config.campaign.delay_between_iterations = 0;
    config.campaign.probe.interval_ms = 100;
    config.campaign.max_parallel_pairs = 2;
    config.provisioner.settle_secs = 0;
    config
}

#[derive(Default)]
struct StaticProvisioner {
    endpoints: Vec<Endpoint>,
    fail: bool,
    provisions: AtomicUsize,
    releases: AtomicUsize,
}

impl StaticProvisioner {
    fn with(endpoints: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            endpoints,
            ..Self::default()
        })
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(&self, _spec: &TopologySpec) -> Result<TopologyHandle, ProvisionError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProvisionError::Command("mininet unavailable".into()));
        }
        Ok(TopologyHandle {
            id: "static".into(),
            endpoints: self.endpoints.clone(),
        })
    }

    async fn release(&self, _handle: &TopologyHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers every probe after `rtt_ms`. Stops the campaign on call
/// `cancel_on_call` and reports the unit as interrupted.
struct FixedProbe {
    rtt_ms: u64,
    calls: AtomicUsize,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl FixedProbe {
    fn new(rtt_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            rtt_ms,
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        })
    }
}

#[async_trait]
impl LatencyProbe for FixedProbe {
    async fn run(
        &self,
        _pair: &HostPair,
        session: &ProbeSession,
        cancel: &CancellationToken,
    ) -> Result<LatencyResult, ProbeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_call {
            if call == *at {
                token.cancel();
                cancel.cancelled().await;
                return Err(ProbeError::Interrupted);
            }
        }

        let probes = (session.duration.as_millis() / session.interval.as_millis()) as u64;
        let samples: Vec<ProbeSample> = (0..probes)
            .map(|seq| {
                let sent = session.interval * seq as u32;
                ProbeSample::received(seq, sent, sent + Duration::from_millis(self.rtt_ms))
            })
            .collect::<Result<_, _>>()?;
        Ok(LatencyResult::from_samples(&samples)?)
    }
}

/// Reports `mbps` for every pair except those whose client is `failing`.
struct FixedThroughput {
    mbps: f64,
    failing: Option<&'static str>,
}

#[async_trait]
impl ThroughputTool for FixedThroughput {
    async fn measure(
        &self,
        pair: &HostPair,
        request: &ThroughputRequest,
        _cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ThroughputToolError> {
        if self.failing == Some(pair.client.name.as_str()) {
            return Err(ThroughputToolError::NonZeroExit {
                code: Some(1),
                stderr: "iperf3: error - unable to connect to server".into(),
            });
        }
        Ok(ThroughputResult {
            protocol: request.protocol,
            throughput_mbps: self.mbps,
            retransmissions: Some(0),
            jitter_ms: None,
            packet_loss_percent: None,
            bytes_sent: None,
            bytes_received: None,
            duration_secs: request.duration.as_secs_f64(),
        })
    }
}

fn throughput(mbps: f64) -> Arc<FixedThroughput> {
    Arc::new(FixedThroughput {
        mbps,
        failing: None,
    })
}

/// Records the state of every run handed to it.
#[derive(Default)]
struct CapturingRenderer {
    seen: Mutex<Vec<CampaignState>>,
    fail: bool,
}

impl ReportRenderer for CapturingRenderer {
    fn render(&self, run: &CampaignRun) -> Result<Vec<std::path::PathBuf>, ReportError> {
        self.seen.lock().push(run.state());
        if self.fail {
            return Err(ReportError::Io(std::io::Error::other("disk full")));
        }
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_passing_campaign_walks_every_state() {
    let provisioner = StaticProvisioner::with(star(1));
    let renderer = Arc::new(CapturingRenderer::default());
    let orchestrator = CampaignOrchestrator::new(
        config(2),
        provisioner.clone(),
        FixedProbe::new(5),
        throughput(94.0),
    )
    .with_renderer(renderer.clone());

    let run = orchestrator.run().await.unwrap();

    assert_eq!(run.state(), CampaignState::Released);
    assert!(run.passed());
    assert_eq!(run.iterations_completed(), 2);
    assert_eq!(run.latency().len(), 2);
    assert_eq!(run.throughput().len(), 2);
    assert!(run.failures().is_empty());
    assert!(run.finished_at().is_some());

    let states: Vec<CampaignState> = run.transitions().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            CampaignState::Provisioning,
            CampaignState::Running,
            CampaignState::Evaluating,
            CampaignState::Reporting,
            CampaignState::Released,
        ]
    );
    assert_eq!(*renderer.seen.lock(), vec![CampaignState::Reporting]);
    assert_eq!(provisioner.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_throughput_failure_fails_only_that_pair() {
    let provisioner = StaticProvisioner::with(star(2));
    let tool = Arc::new(FixedThroughput {
        mbps: 94.0,
        failing: Some("h3"),
    });
    let orchestrator =
        CampaignOrchestrator::new(config(2), provisioner.clone(), FixedProbe::new(5), tool);

    let run = orchestrator.run().await.unwrap();

    assert_eq!(run.state(), CampaignState::Released);
    assert!(!run.passed());
    assert!(run.throughput().iter().all(|r| r.pair != "h3->h1"));
    assert_eq!(run.failures().len(), 2);
    assert!(run
        .failures()
        .iter()
        .all(|f| f.pair == "h3->h1" && matches!(f.kind, UnitKind::Throughput(_))));

    let verdict = run.verdict().unwrap();
    let failed: Vec<_> = verdict.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metric, Metric::Throughput);
    assert_eq!(failed[0].pair, "h3->h1");
    assert_eq!(failed[0].observed, None);
    assert_eq!(provisioner.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_skip_policy_drops_failed_pair_from_later_iterations() {
    let mut config = config(3);
    config.campaign.failure_policy = FailurePolicy::SkipPairAfterFailure;
    let tool = Arc::new(FixedThroughput {
        mbps: 94.0,
        failing: Some("h3"),
    });
    let orchestrator = CampaignOrchestrator::new(
        config,
        StaticProvisioner::with(star(2)),
        FixedProbe::new(5),
        tool,
    );

    let run = orchestrator.run().await.unwrap();

    assert_eq!(run.iterations_completed(), 3);
    assert_eq!(run.failures().len(), 1);
    assert_eq!(run.latency().iter().filter(|r| r.pair == "h3->h1").count(), 1);
    assert_eq!(run.latency().iter().filter(|r| r.pair == "h2->h1").count(), 3);
}

#[tokio::test]
async fn test_stop_during_third_iteration_keeps_collected_data() {
    let cancel = CancellationToken::new();
    let probe = Arc::new(FixedProbe {
        rtt_ms: 5,
        calls: AtomicUsize::new(0),
        cancel_on_call: Some((3, cancel.clone())),
    });
    let provisioner = StaticProvisioner::with(star(1));
    let orchestrator = CampaignOrchestrator::new(
        config(5),
        provisioner.clone(),
        probe,
        throughput(94.0),
    )
    .with_cancellation(cancel);

    let run = orchestrator.run().await.unwrap();

    assert_eq!(run.state(), CampaignState::Released);
    assert!(run.cancelled());
    assert_eq!(run.iterations_completed(), 2);
    assert_eq!(run.latency().len(), 2);
    assert_eq!(run.interrupted().len(), 1);
    assert_eq!(run.interrupted()[0].iteration, 3);
    assert!(run.failures().is_empty());
    assert!(run.verdict().is_some());
    assert_eq!(provisioner.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_single_iteration_aggregate_equals_iteration_value() {
    let orchestrator = CampaignOrchestrator::new(
        config(1),
        StaticProvisioner::with(star(1)),
        FixedProbe::new(7),
        throughput(42.5),
    );

    let run = orchestrator.run().await.unwrap();
    let verdict = run.verdict().unwrap();

    let latency = verdict
        .verdicts
        .iter()
        .find(|v| v.metric == Metric::Latency)
        .unwrap();
    let measured = run.latency()[0].result.rtt_mean_ms().unwrap();
    assert!((latency.observed.unwrap() - measured).abs() < 1e-9);
    assert_eq!(latency.samples, 1);

    let tput = verdict
        .verdicts
        .iter()
        .find(|v| v.metric == Metric::Throughput)
        .unwrap();
    assert_eq!(tput.observed, Some(42.5));
}

#[tokio::test]
async fn test_renderer_failure_does_not_change_outcome() {
    let renderer = Arc::new(CapturingRenderer {
        fail: true,
        ..CapturingRenderer::default()
    });
    let orchestrator = CampaignOrchestrator::new(
        config(1),
        StaticProvisioner::with(star(1)),
        FixedProbe::new(5),
        throughput(94.0),
    )
    .with_renderer(renderer.clone());

    let run = orchestrator.run().await.unwrap();
    assert_eq!(run.state(), CampaignState::Released);
    assert!(run.passed());
    assert_eq!(renderer.seen.lock().len(), 1);
}

#[tokio::test]
async fn test_network_without_pairs_aborts_and_releases() {
    let provisioner = StaticProvisioner::with(vec![
        endpoint("h1", 1, EndpointRole::Client),
        endpoint("h2", 2, EndpointRole::Client),
    ]);
    let renderer = Arc::new(CapturingRenderer::default());
    let orchestrator = CampaignOrchestrator::new(
        config(1),
        provisioner.clone(),
        FixedProbe::new(5),
        throughput(94.0),
    )
    .with_renderer(renderer.clone());

    let aborted = orchestrator.run().await.unwrap_err();
    assert!(matches!(aborted.source, CampaignError::NoHostPairs));
    assert_eq!(aborted.run.state(), CampaignState::Aborted);
    assert!(aborted.run.abort_reason().is_some());
    assert_eq!(provisioner.releases.load(Ordering::SeqCst), 1);
    assert!(renderer.seen.lock().is_empty());
}

#[tokio::test]
async fn test_invalid_config_aborts_before_provisioning() {
    let provisioner = StaticProvisioner::with(star(1));
    let orchestrator = CampaignOrchestrator::new(
        config(0),
        provisioner.clone(),
        FixedProbe::new(5),
        throughput(94.0),
    );

    let aborted = orchestrator.run().await.unwrap_err();
    assert!(matches!(aborted.source, CampaignError::Config(_)));
    assert_eq!(aborted.run.transitions().len(), 1);
    assert_eq!(provisioner.provisions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provision_failure_aborts() {
    let provisioner = Arc::new(StaticProvisioner {
        fail: true,
        ..StaticProvisioner::default()
    });
    let orchestrator = CampaignOrchestrator::new(
        config(1),
        provisioner.clone(),
        FixedProbe::new(5),
        throughput(94.0),
    );

    let aborted = orchestrator.run().await.unwrap_err();
    assert!(matches!(aborted.source, CampaignError::Provision(_)));
    let states: Vec<CampaignState> = aborted.run.transitions().iter().map(|t| t.to).collect();
    assert_eq!(states, vec![CampaignState::Provisioning, CampaignState::Aborted]);
    assert_eq!(provisioner.releases.load(Ordering::SeqCst), 0);
}
