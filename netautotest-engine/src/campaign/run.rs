//! The campaign run record.
//!
//! A [`RunBuilder`] accumulates state while the campaign executes; unit
//! tasks append to its shared [`RunLog`]. Once the network is released the
//! builder is sealed into an immutable [`CampaignRun`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use netautotest_config::ThresholdSet;
use netautotest_core::Protocol;

use crate::evaluator::{CampaignVerdict, MetricObservation};
use crate::record::{InterruptedUnit, LatencyRecord, ThroughputRecord, UnitFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Idle,
    Provisioning,
    Running,
    Evaluating,
    Reporting,
    Released,
    Aborted,
}

impl CampaignState {
    pub fn can_transition_to(self, next: CampaignState) -> bool {
        use CampaignState::*;
        matches!(
            (self, next),
            (Idle, Provisioning)
                | (Provisioning, Running)
                | (Running, Evaluating)
                | (Evaluating, Reporting)
                | (Reporting, Released)
                | (Idle, Aborted)
                | (Provisioning, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignState::Released | CampaignState::Aborted)
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CampaignState::Idle => "idle",
            CampaignState::Provisioning => "provisioning",
            CampaignState::Running => "running",
            CampaignState::Evaluating => "evaluating",
            CampaignState::Reporting => "reporting",
            CampaignState::Released => "released",
            CampaignState::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: CampaignState,
    pub to: CampaignState,
    pub at: DateTime<Utc>,
}

/// Unit outputs appended concurrently by the per-pair tasks.
#[derive(Debug, Default, Clone)]
pub(crate) struct RunLog {
    pub latency: Vec<LatencyRecord>,
    pub throughput: Vec<ThroughputRecord>,
    pub failures: Vec<UnitFailure>,
    pub interrupted: Vec<InterruptedUnit>,
}

/// Generates a run id of the form `YYYYMMDD_HHMMSS` (local time).
pub fn campaign_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) struct RunBuilder {
    id: String,
    started_at: DateTime<Utc>,
    state: CampaignState,
    transitions: Vec<StateTransition>,
    handle_id: Option<String>,
    pairs: Vec<String>,
    protocols: Vec<Protocol>,
    thresholds: ThresholdSet,
    iterations_planned: u32,
    iterations_completed: u32,
    cancelled: bool,
    aggregates: Vec<MetricObservation>,
    verdict: Option<CampaignVerdict>,
    abort_reason: Option<String>,
    log: Arc<Mutex<RunLog>>,
}

impl RunBuilder {
    pub fn new(
        id: String,
        protocols: Vec<Protocol>,
        thresholds: ThresholdSet,
        iterations_planned: u32,
    ) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            state: CampaignState::Idle,
            transitions: Vec::new(),
            handle_id: None,
            pairs: Vec::new(),
            protocols,
            thresholds,
            iterations_planned,
            iterations_completed: 0,
            cancelled: false,
            aggregates: Vec::new(),
            verdict: None,
            abort_reason: None,
            log: Arc::new(Mutex::new(RunLog::default())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    /// Records a transition and returns the previous state.
    pub fn transition(&mut self, to: CampaignState) -> CampaignState {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to),
            "invalid campaign transition {from} -> {to}"
        );
        self.transitions.push(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;
        from
    }

    pub fn log(&self) -> Arc<Mutex<RunLog>> {
        Arc::clone(&self.log)
    }

    pub fn set_network(&mut self, handle_id: &str, pairs: Vec<String>) {
        self.handle_id = Some(handle_id.to_string());
        self.pairs = pairs;
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn complete_iteration(&mut self, iteration: u32) {
        self.iterations_completed = iteration;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn set_evaluation(&mut self, aggregates: Vec<MetricObservation>, verdict: CampaignVerdict) {
        self.aggregates = aggregates;
        self.verdict = Some(verdict);
    }

    pub fn abort(&mut self, reason: String) {
        self.transition(CampaignState::Aborted);
        self.abort_reason = Some(reason);
    }

    /// Copy of the current state, for report rendering before release.
    pub fn snapshot(&self) -> CampaignRun {
        let log = self.log.lock().clone();
        self.build(log, None)
    }

    pub fn seal(self) -> CampaignRun {
        let log = self.log.lock().clone();
        self.build(log, Some(Utc::now()))
    }

    fn build(&self, log: RunLog, finished_at: Option<DateTime<Utc>>) -> CampaignRun {
        CampaignRun {
            id: self.id.clone(),
            started_at: self.started_at,
            finished_at,
            state: self.state,
            transitions: self.transitions.clone(),
            handle_id: self.handle_id.clone(),
            pairs: self.pairs.clone(),
            protocols: self.protocols.clone(),
            thresholds: self.thresholds.clone(),
            iterations_planned: self.iterations_planned,
            iterations_completed: self.iterations_completed,
            cancelled: self.cancelled,
            latency: log.latency,
            throughput: log.throughput,
            failures: log.failures,
            interrupted: log.interrupted,
            aggregates: self.aggregates.clone(),
            verdict: self.verdict.clone(),
            abort_reason: self.abort_reason.clone(),
        }
    }
}

/// Everything a campaign produced. Read-only once returned.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignRun {
    id: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: CampaignState,
    transitions: Vec<StateTransition>,
    handle_id: Option<String>,
    pairs: Vec<String>,
    protocols: Vec<Protocol>,
    thresholds: ThresholdSet,
    iterations_planned: u32,
    iterations_completed: u32,
    cancelled: bool,
    latency: Vec<LatencyRecord>,
    throughput: Vec<ThroughputRecord>,
    failures: Vec<UnitFailure>,
    interrupted: Vec<InterruptedUnit>,
    aggregates: Vec<MetricObservation>,
    verdict: Option<CampaignVerdict>,
    abort_reason: Option<String>,
}

impl CampaignRun {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn handle_id(&self) -> Option<&str> {
        self.handle_id.as_deref()
    }

    /// Host-pair labels in evaluation order.
    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn iterations_planned(&self) -> u32 {
        self.iterations_planned
    }

    pub fn iterations_completed(&self) -> u32 {
        self.iterations_completed
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn latency(&self) -> &[LatencyRecord] {
        &self.latency
    }

    pub fn throughput(&self) -> &[ThroughputRecord] {
        &self.throughput
    }

    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    pub fn interrupted(&self) -> &[InterruptedUnit] {
        &self.interrupted
    }

    pub fn aggregates(&self) -> &[MetricObservation] {
        &self.aggregates
    }

    pub fn verdict(&self) -> Option<&CampaignVerdict> {
        self.verdict.as_ref()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// True only for a released campaign whose verdict passed.
    pub fn passed(&self) -> bool {
        self.state == CampaignState::Released && self.verdict.as_ref().is_some_and(|v| v.passed)
    }
}
