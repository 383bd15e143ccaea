//! Campaign orchestrator.
//!
//! Drives a campaign through `Idle → Provisioning → Running → Evaluating →
//! Reporting → Released`, or to `Aborted` when configuration or
//! provisioning fails. Unit failures never abort a campaign; they are
//! recorded and judged by the evaluator. A stop request ends the running
//! phase early, after which the campaign is still evaluated, reported and
//! released.

mod lease;
mod run;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use validator::Validate;

use netautotest_config::{ConfigError, FailurePolicy, NetAutoTestConfig, PortsConfig};
use netautotest_core::provision::Provisioner;
use netautotest_core::{HostPair, Protocol};
use netautotest_telemetry::{EventLogger, MetricsRecorder, UnitOutcome};

use crate::error::{CampaignError, ProbeError, ThroughputToolError};
use crate::evaluator::{aggregate, evaluate};
use crate::prober::{LatencyProbe, ProbeSession};
use crate::record::{InterruptedUnit, LatencyRecord, ThroughputRecord, UnitFailure, UnitKind};
use crate::report::ReportRenderer;
use crate::throughput::{ThroughputRequest, ThroughputTool};

pub use lease::NetworkLease;
pub use run::{campaign_id, CampaignRun, CampaignState, StateTransition};

pub(crate) use run::{RunBuilder, RunLog};

/// A campaign that ended in `Aborted`. Carries the sealed run for its
/// transition history.
#[derive(Debug, Error)]
#[error("Campaign {id} aborted: {source}")]
pub struct CampaignAborted {
    pub id: String,
    #[source]
    pub source: CampaignError,
    pub run: Box<CampaignRun>,
}

pub struct CampaignOrchestrator {
    config: Arc<NetAutoTestConfig>,
    provisioner: Arc<dyn Provisioner>,
    prober: Arc<dyn LatencyProbe>,
    throughput: Arc<dyn ThroughputTool>,
    renderers: Vec<Arc<dyn ReportRenderer>>,
    metrics: Option<Arc<MetricsRecorder>>,
    cancel: CancellationToken,
}

impl CampaignOrchestrator {
    pub fn new(
        config: NetAutoTestConfig,
        provisioner: Arc<dyn Provisioner>,
        prober: Arc<dyn LatencyProbe>,
        throughput: Arc<dyn ThroughputTool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provisioner,
            prober,
            throughput,
            renderers: Vec::new(),
            metrics: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the campaign when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<CampaignRun, CampaignAborted> {
        let settings = &self.config.campaign;
        let run = RunBuilder::new(
            campaign_id(),
            settings.protocols.clone(),
            settings.thresholds.clone(),
            settings.iterations,
        );
        let span = info_span!("campaign", id = %run.id());
        self.execute(run).instrument(span).await
    }

    async fn execute(&self, mut run: RunBuilder) -> Result<CampaignRun, CampaignAborted> {
        info!(
            iterations = self.config.campaign.iterations,
            duration_secs = self.config.campaign.duration_seconds,
            "Campaign created"
        );

        if let Err(e) = self.config.validate() {
            return Err(self
                .abort(run, CampaignError::Config(ConfigError::from(e)), None)
                .await);
        }

        self.enter(&mut run, CampaignState::Provisioning).await;
        let spec = self.config.topology.to_spec();
        let handle = match self.provisioner.provision(&spec).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.abort(run, CampaignError::Provision(e), None).await),
        };
        let lease = NetworkLease::new(Arc::clone(&self.provisioner), handle);
        info!(handle = %lease.handle().id, endpoints = lease.handle().endpoints.len(), "Network provisioned");

        let settle = Duration::from_secs(self.config.provisioner.settle_secs);
        if !settle.is_zero() {
            debug!(?settle, "Waiting for the network to settle");
            self.pause(settle).await;
        }

        let pairs = lease.handle().host_pairs();
        if pairs.is_empty() {
            return Err(self
                .abort(run, CampaignError::NoHostPairs, Some(lease))
                .await);
        }
        for pair in &pairs {
            info!(%pair, "Host-pair resolved");
        }
        run.set_network(&lease.handle().id, pairs.iter().map(HostPair::label).collect());

        self.enter(&mut run, CampaignState::Running).await;
        self.run_iterations(&mut run, &pairs).await;

        self.enter(&mut run, CampaignState::Evaluating).await;
        let aggregates = {
            let shared = run.log();
            let log = shared.lock();
            aggregate(
                run.pairs(),
                run.protocols(),
                &log.latency,
                &log.throughput,
                &log.failures,
            )
        };
        let verdict = evaluate(&aggregates, run.thresholds());
        for metric in &verdict.verdicts {
            if metric.passed {
                info!("{metric}");
            } else {
                warn!("{metric}");
            }
        }
        info!(passed = verdict.passed, "Campaign evaluated");
        EventLogger::log_event(
            "verdict",
            vec![
                KeyValue::new("campaign", run.id().to_string()),
                KeyValue::new("passed", verdict.passed),
                KeyValue::new("failed_metrics", verdict.failures().count() as i64),
            ],
        )
        .await;
        run.set_evaluation(aggregates, verdict);

        self.enter(&mut run, CampaignState::Reporting).await;
        let snapshot = run.snapshot();
        for renderer in &self.renderers {
            match renderer.render(&snapshot) {
                Ok(paths) => {
                    for path in paths {
                        info!(path = %path.display(), "Report written");
                    }
                }
                Err(e) => error!(error = %e, "Report rendering failed"),
            }
        }

        lease.release().await;
        self.enter(&mut run, CampaignState::Released).await;
        Ok(run.seal())
    }

    async fn run_iterations(&self, run: &mut RunBuilder, pairs: &[HostPair]) {
        let settings = &self.config.campaign;
        let ctx = Arc::new(UnitContext {
            prober: Arc::clone(&self.prober),
            throughput: Arc::clone(&self.throughput),
            session: ProbeSession::from_settings(settings),
            protocols: settings.protocols.clone(),
            ports: settings.ports.clone(),
            duration: settings.session_duration(),
            log: run.log(),
            metrics: self.metrics.clone(),
            cancel: self.cancel.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(settings.max_parallel_pairs.max(1)));
        let locks = HostLocks::new(pairs);
        let mut skipped: HashSet<String> = HashSet::new();

        for iteration in 1..=settings.iterations {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(iteration, total = settings.iterations, "Iteration started");

            let failed = run_iteration(&ctx, iteration, pairs, &locks, &semaphore, &skipped).await;
            if self.cancel.is_cancelled() {
                warn!(iteration, "Campaign stopped during iteration");
                break;
            }
            run.complete_iteration(iteration);
            info!(iteration, failed_pairs = failed.len(), "Iteration completed");

            if settings.failure_policy == FailurePolicy::SkipPairAfterFailure {
                for pair in failed {
                    if skipped.insert(pair.clone()) {
                        warn!(%pair, "Skipping pair for the remaining iterations");
                    }
                }
            }

            if iteration < settings.iterations && !self.pause(settings.iteration_delay()).await {
                break;
            }
        }

        if self.cancel.is_cancelled() {
            run.mark_cancelled();
        }
    }

    /// Sleeps unless stopped first. Returns `false` when stopped.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn enter(&self, run: &mut RunBuilder, to: CampaignState) {
        let from = run.transition(to);
        info!(%from, %to, "Campaign state changed");
        EventLogger::log_event(
            "state_transition",
            vec![
                KeyValue::new("campaign", run.id().to_string()),
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        )
        .await;
    }

    async fn abort(
        &self,
        mut run: RunBuilder,
        source: CampaignError,
        lease: Option<NetworkLease>,
    ) -> CampaignAborted {
        if let Some(lease) = lease {
            lease.release().await;
        }
        error!(error = %source, state = %run.state(), "Campaign aborted");
        let from = run.state();
        run.abort(source.to_string());
        EventLogger::log_event(
            "state_transition",
            vec![
                KeyValue::new("campaign", run.id().to_string()),
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", CampaignState::Aborted.to_string()),
                KeyValue::new("reason", source.to_string()),
            ],
        )
        .await;
        CampaignAborted {
            id: run.id().to_string(),
            source,
            run: Box::new(run.seal()),
        }
    }
}

/// One lock per host; pairs sharing a host never run concurrently.
struct HostLocks {
    locks: HashMap<String, Arc<AsyncMutex<()>>>,
}

impl HostLocks {
    fn new(pairs: &[HostPair]) -> Self {
        let mut locks = HashMap::new();
        for pair in pairs {
            for host in pair.hosts() {
                locks
                    .entry(host.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(())));
            }
        }
        Self { locks }
    }

    /// Locks of the pair's hosts, in the sorted order they must be taken.
    fn for_pair(&self, pair: &HostPair) -> Vec<Arc<AsyncMutex<()>>> {
        pair.hosts()
            .into_iter()
            .filter_map(|host| self.locks.get(host).cloned())
            .collect()
    }
}

/// Runs every non-skipped pair once. Returns the labels of pairs with at
/// least one failed unit.
async fn run_iteration(
    ctx: &Arc<UnitContext>,
    iteration: u32,
    pairs: &[HostPair],
    locks: &HostLocks,
    semaphore: &Arc<Semaphore>,
    skipped: &HashSet<String>,
) -> HashSet<String> {
    let mut tasks = JoinSet::new();

    for pair in pairs {
        let label = pair.label();
        if skipped.contains(&label) {
            debug!(pair = %label, "Pair skipped after earlier failure");
            continue;
        }

        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(semaphore);
        let host_locks = locks.for_pair(pair);
        let pair = pair.clone();
        let span = info_span!("pair", iteration, pair = %label);

        tasks.spawn(
            async move {
                // Hosts first: a pair waiting on a busy host must not hold a
                // permit another pair could run with.
                let mut guards = Vec::with_capacity(host_locks.len());
                for lock in host_locks {
                    guards.push(lock.lock_owned().await);
                }
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (label, false);
                };
                let failed = ctx.run_pair(iteration, &pair).await;
                (label, failed)
            }
            .instrument(span),
        );
    }

    let mut failed = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((label, true)) => {
                failed.insert(label);
            }
            Ok(_) => {}
            Err(e) => error!(iteration, error = %e, "Pair task ended abnormally"),
        }
    }
    failed
}

/// Everything a pair task needs, shared across tasks.
struct UnitContext {
    prober: Arc<dyn LatencyProbe>,
    throughput: Arc<dyn ThroughputTool>,
    session: ProbeSession,
    protocols: Vec<Protocol>,
    ports: PortsConfig,
    duration: Duration,
    log: Arc<Mutex<RunLog>>,
    metrics: Option<Arc<MetricsRecorder>>,
    cancel: CancellationToken,
}

impl UnitContext {
    /// Latency session first, then one throughput run per protocol. Returns
    /// whether any unit failed.
    async fn run_pair(&self, iteration: u32, pair: &HostPair) -> bool {
        let label = pair.label();
        let mut failed = false;

        if self.cancel.is_cancelled() {
            return failed;
        }
        match self.prober.run(pair, &self.session, &self.cancel).await {
            Ok(result) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_latency(
                        &label,
                        result.rtt_mean_ms(),
                        result.jitter_ms,
                        result.packet_loss_percent,
                        &result.rtt_samples_ms,
                    );
                    metrics.inc_units(UnitOutcome::Completed);
                }
                info!(
                    rtt_mean_ms = ?result.rtt_mean_ms(),
                    jitter_ms = ?result.jitter_ms,
                    loss_percent = result.packet_loss_percent,
                    "Latency measured"
                );
                self.log.lock().latency.push(LatencyRecord {
                    iteration,
                    pair: label.clone(),
                    result,
                });
            }
            Err(ProbeError::Interrupted) => {
                self.interrupted(iteration, &label, UnitKind::Latency);
                return failed;
            }
            Err(e) => {
                failed = true;
                self.fail(iteration, &label, UnitKind::Latency, e.to_string())
                    .await;
            }
        }

        for protocol in &self.protocols {
            if self.cancel.is_cancelled() {
                return failed;
            }
            let kind = UnitKind::Throughput(*protocol);
            let request = ThroughputRequest {
                protocol: *protocol,
                duration: self.duration,
                port: self.ports.for_protocol(*protocol),
            };
            match self.throughput.measure(pair, &request, &self.cancel).await {
                Ok(result) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.observe_throughput(&label, protocol.as_str(), result.throughput_mbps);
                        metrics.inc_units(UnitOutcome::Completed);
                    }
                    info!(%protocol, mbps = result.throughput_mbps, "Throughput measured");
                    self.log.lock().throughput.push(ThroughputRecord {
                        iteration,
                        pair: label.clone(),
                        result,
                    });
                }
                Err(ThroughputToolError::Interrupted) => {
                    self.interrupted(iteration, &label, kind);
                    return failed;
                }
                Err(e) => {
                    failed = true;
                    self.fail(iteration, &label, kind, e.to_string()).await;
                }
            }
        }

        failed
    }

    fn interrupted(&self, iteration: u32, pair: &str, kind: UnitKind) {
        info!(unit = %kind, "Unit interrupted by stop request");
        if let Some(metrics) = &self.metrics {
            metrics.inc_units(UnitOutcome::Interrupted);
        }
        self.log.lock().interrupted.push(InterruptedUnit {
            iteration,
            pair: pair.to_string(),
            kind,
        });
    }

    async fn fail(&self, iteration: u32, pair: &str, kind: UnitKind, error: String) {
        warn!(unit = %kind, %error, "Unit failed");
        if let Some(metrics) = &self.metrics {
            metrics.inc_units(UnitOutcome::Failed);
        }
        EventLogger::log_event(
            "unit_failure",
            vec![
                KeyValue::new("iteration", i64::from(iteration)),
                KeyValue::new("pair", pair.to_string()),
                KeyValue::new("unit", kind.to_string()),
                KeyValue::new("error", error.clone()),
            ],
        )
        .await;
        self.log.lock().failures.push(UnitFailure {
            iteration,
            pair: pair.to_string(),
            kind,
            error,
        });
    }
}
