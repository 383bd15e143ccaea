use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use netautotest_config::NetAutoTestConfig;
use netautotest_core::{HostPair, ThroughputResult};
use netautotest_engine::{
    CampaignOrchestrator, CampaignState, SourceBinding, ThroughputRequest, ThroughputTool,
    ThroughputToolError, UdpLatencyProber,
};
use netautotest_simulator::LoopbackProvisioner;

struct NullThroughput;

#[async_trait]
impl ThroughputTool for NullThroughput {
    async fn measure(
        &self,
        _pair: &HostPair,
        request: &ThroughputRequest,
        _cancel: &CancellationToken,
    ) -> Result<ThroughputResult, ThroughputToolError> {
        Ok(ThroughputResult {
            protocol: request.protocol,
            throughput_mbps: 100.0,
            retransmissions: None,
            jitter_ms: None,
            packet_loss_percent: None,
            bytes_sent: None,
            bytes_received: None,
            duration_secs: request.duration.as_secs_f64(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_latency_session_over_loopback_reflectors() {
    let port = 47_311;
    let mut config = NetAutoTestConfig::default();
    config.topology.hosts = 3;
    config.campaign.iterations = 1;
    config.campaign.duration_seconds = 1;
    config.campaign.delay_between_iterations = 0;
    config.campaign.probe.interval_ms = 200;
    config.campaign.ports.latency = port;
    config.provisioner.settle_secs = 0;

    let provisioner = Arc::new(
        LoopbackProvisioner::new(port)
            .with_base(Ipv4Addr::new(127, 41, 0, 1))
            .without_impairment(),
    );
    let orchestrator = CampaignOrchestrator::new(
        config,
        provisioner.clone(),
        Arc::new(UdpLatencyProber::new(SourceBinding::ClientAddress)),
        Arc::new(NullThroughput),
    );

    let run = orchestrator.run().await.unwrap();

    assert_eq!(run.state(), CampaignState::Released);
    assert_eq!(run.pairs(), ["h2->h1", "h3->h1"]);
    assert_eq!(run.latency().len(), 2);
    for record in run.latency() {
        assert_eq!(record.result.samples_sent, 5);
        assert_eq!(record.result.samples_received, 5);
        assert_eq!(record.result.packet_loss_percent, 0.0);
        assert!(record.result.rtt_mean_ms().unwrap() < 50.0);
    }
    assert!(run.passed());
    assert_eq!(provisioner.active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_link_latency_is_visible_in_results() {
    let port = 47_312;
    let mut config = NetAutoTestConfig::default();
    config.topology.hosts = 2;
    config.topology.latency_ms = 30;
    config.topology.packet_loss = 0.0;
    config.campaign.iterations = 1;
    config.campaign.duration_seconds = 1;
    config.campaign.probe.interval_ms = 250;
    config.campaign.ports.latency = port;
    config.campaign.thresholds.max_latency_ms = Some(20.0);
    config.provisioner.settle_secs = 0;

    let provisioner = Arc::new(
        LoopbackProvisioner::new(port).with_base(Ipv4Addr::new(127, 42, 0, 1)),
    );
    let orchestrator = CampaignOrchestrator::new(
        config,
        provisioner.clone(),
        Arc::new(UdpLatencyProber::new(SourceBinding::ClientAddress)),
        Arc::new(NullThroughput),
    );

    let run = orchestrator.run().await.unwrap();

    let rtt = run.latency()[0].result.rtt_mean_ms().unwrap();
    assert!(rtt >= 30.0, "rtt {rtt} below configured link latency");
    assert!(!run.passed());
    assert_eq!(provisioner.active(), 0);
}
