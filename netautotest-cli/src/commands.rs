use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use validator::Validate;

use netautotest_config::{ConfigError, NetAutoTestConfig, ProvisionerBackend};
use netautotest_core::provision::Provisioner;
use netautotest_engine::{
    CampaignOrchestrator, CampaignRun, CommandProvisioner, EchoResponder, Iperf3Tool,
    JsonReportRenderer, SourceBinding, UdpLatencyProber,
};
use netautotest_simulator::LoopbackProvisioner;
use netautotest_telemetry::{EventLogger, MetricsRecorder};

use crate::outcome::Outcome;

#[derive(Parser, Debug)]
#[command(version, about = "Network performance test campaigns")]
pub struct Cli {
    /// Configuration file. Without it `config/netautotest.yaml` and
    /// `config/<NETAUTOTEST_ENV>.yaml` are layered over the defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `telemetry.log_level`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the network, run every iteration and report the verdict
    Run(RunArgs),
    /// Check the configuration and print the effective values
    Validate,
    /// Answer latency probes (server side of a probe session)
    Echo(EchoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Overrides `campaign.iterations`
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Overrides `reporting.output_dir`
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EchoArgs {
    #[arg(short, long, default_value = "0.0.0.0:5003")]
    pub bind: SocketAddr,
}

fn load_config(path: Option<&Path>) -> Result<NetAutoTestConfig, ConfigError> {
    match path {
        Some(path) => NetAutoTestConfig::load_from_path(path),
        None => NetAutoTestConfig::load(),
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<Outcome> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.telemetry.log_level = level;
    }
    EventLogger::init(&config.telemetry.log_level);

    match cli.command {
        Commands::Run(args) => {
            if let Some(iterations) = args.iterations {
                config.campaign.iterations = iterations;
            }
            if let Some(dir) = args.output_dir {
                config.reporting.output_dir = dir;
            }
            run_campaign(config).await
        }
        Commands::Validate => validate(&config),
        Commands::Echo(args) => echo(args.bind).await,
    }
}

fn validate(config: &NetAutoTestConfig) -> anyhow::Result<Outcome> {
    config.validate().map_err(ConfigError::from)?;
    let rendered = serde_yaml::to_string(config).context("rendering configuration")?;
    println!("{rendered}");
    println!("Configuration is valid");
    Ok(Outcome::Passed)
}

/// Cancels `token` on the first Ctrl-C.
fn stop_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing with the data collected so far");
            token.cancel();
        }
    });
}

async fn run_campaign(config: NetAutoTestConfig) -> anyhow::Result<Outcome> {
    let metrics = if config.telemetry.metrics {
        Some(Arc::new(
            MetricsRecorder::new().context("registering metrics")?,
        ))
    } else {
        None
    };
    let metrics_file = config.telemetry.metrics_file.clone();

    // Loopback hosts share one machine, so probes must leave from the
    // client's own address to be told apart.
    let (provisioner, binding): (Arc<dyn Provisioner>, SourceBinding) =
        match &config.provisioner.backend {
            ProvisionerBackend::Loopback => (
                Arc::new(LoopbackProvisioner::new(config.campaign.ports.latency)),
                SourceBinding::ClientAddress,
            ),
            ProvisionerBackend::Command { up, down } => (
                Arc::new(CommandProvisioner::new(up.clone(), down.clone())),
                SourceBinding::Unspecified,
            ),
        };
    let prober = Arc::new(UdpLatencyProber::new(binding));
    let tool = Arc::new(Iperf3Tool::new(&config.campaign.throughput));
    let renderer = Arc::new(JsonReportRenderer::from_config(&config.reporting));

    let mut orchestrator =
        CampaignOrchestrator::new(config, provisioner, prober, tool).with_renderer(renderer);
    if let Some(metrics) = &metrics {
        orchestrator = orchestrator.with_metrics(Arc::clone(metrics));
    }
    stop_on_ctrl_c(orchestrator.cancellation_token());

    let result = orchestrator.run().await;

    if let (Some(metrics), Some(path)) = (&metrics, &metrics_file) {
        match metrics.write_to_file(path) {
            Ok(()) => info!(path = %path.display(), "Metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write metrics"),
        }
    }

    let run = result?;
    print_summary(&run);
    Ok(Outcome::from_run(&run))
}

fn print_summary(run: &CampaignRun) {
    println!(
        "Campaign {}: {}/{} iterations{}",
        run.id(),
        run.iterations_completed(),
        run.iterations_planned(),
        if run.cancelled() { " (stopped early)" } else { "" }
    );
    if let Some(verdict) = run.verdict() {
        for metric in &verdict.verdicts {
            println!("  {metric}");
        }
    }
    if !run.failures().is_empty() {
        println!("  {} unit(s) failed:", run.failures().len());
        for failure in run.failures() {
            println!(
                "    iteration {} {} {}: {}",
                failure.iteration, failure.pair, failure.kind, failure.error
            );
        }
    }
    println!("Verdict: {}", if run.passed() { "PASS" } else { "FAIL" });
}

async fn echo(bind: SocketAddr) -> anyhow::Result<Outcome> {
    let responder = EchoResponder::bind(bind)
        .await
        .with_context(|| format!("binding echo responder to {bind}"))?;
    info!(addr = %responder.local_addr()?, "Echo responder listening");

    let cancel = CancellationToken::new();
    stop_on_ctrl_c(cancel.clone());
    let echoed = responder.run(cancel).await;
    info!(echoed, "Echo responder stopped");
    Ok(Outcome::Passed)
}
