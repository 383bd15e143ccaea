//! Threshold evaluator.
//!
//! Turns per-iteration results into campaign-wide observations (one level of
//! averaging above the per-session statistics) and judges them against the
//! threshold set. Evaluation is pure: no I/O, same input gives the same
//! verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

use netautotest_config::ThresholdSet;
use netautotest_core::stats::mean;
use netautotest_core::Protocol;

use crate::record::{LatencyRecord, ThroughputRecord, UnitFailure, UnitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Latency,
    PacketLoss,
    Jitter,
    Throughput,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Latency => "latency",
            Metric::PacketLoss => "packet_loss",
            Metric::Jitter => "jitter",
            Metric::Throughput => "throughput",
        })
    }
}

/// Campaign-wide mean of a per-iteration value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanOf {
    /// `None` when no iteration produced the value.
    pub value: Option<f64>,
    /// Number of per-iteration values averaged.
    pub samples: usize,
}

impl MeanOf {
    fn of(values: &[f64]) -> Self {
        Self {
            value: mean(values),
            samples: values.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyAggregate {
    pub pair: String,
    pub rtt_mean_ms: MeanOf,
    pub jitter_ms: MeanOf,
    pub packet_loss_percent: MeanOf,
    /// Latency units of this pair that failed.
    pub units_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputAggregate {
    pub pair: String,
    pub protocol: Protocol,
    pub throughput_mbps: MeanOf,
    pub units_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricObservation {
    Latency(LatencyAggregate),
    Throughput(ThroughputAggregate),
}

/// Builds observations in verdict order: per pair its latency aggregate,
/// then one throughput aggregate per configured protocol.
pub fn aggregate(
    pairs: &[String],
    protocols: &[Protocol],
    latency: &[LatencyRecord],
    throughput: &[ThroughputRecord],
    failures: &[UnitFailure],
) -> Vec<MetricObservation> {
    let failed = |pair: &str, kind: UnitKind| {
        failures
            .iter()
            .filter(|f| f.pair == pair && f.kind == kind)
            .count()
    };

    let mut observations = Vec::with_capacity(pairs.len() * (1 + protocols.len()));
    for pair in pairs {
        let results: Vec<_> = latency
            .iter()
            .filter(|r| &r.pair == pair)
            .map(|r| &r.result)
            .collect();
        let rtt: Vec<f64> = results.iter().filter_map(|r| r.rtt_mean_ms()).collect();
        let jitter: Vec<f64> = results.iter().filter_map(|r| r.jitter_ms).collect();
        let loss: Vec<f64> = results.iter().map(|r| r.packet_loss_percent).collect();

        observations.push(MetricObservation::Latency(LatencyAggregate {
            pair: pair.clone(),
            rtt_mean_ms: MeanOf::of(&rtt),
            jitter_ms: MeanOf::of(&jitter),
            packet_loss_percent: MeanOf::of(&loss),
            units_failed: failed(pair, UnitKind::Latency),
        }));

        for protocol in protocols {
            let mbps: Vec<f64> = throughput
                .iter()
                .filter(|r| &r.pair == pair && r.result.protocol == *protocol)
                .map(|r| r.result.throughput_mbps)
                .collect();
            observations.push(MetricObservation::Throughput(ThroughputAggregate {
                pair: pair.clone(),
                protocol: *protocol,
                throughput_mbps: MeanOf::of(&mbps),
                units_failed: failed(pair, UnitKind::Throughput(*protocol)),
            }));
        }
    }
    observations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Passes when observed ≤ limit.
    Max,
    /// Passes when observed ≥ limit.
    Min,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVerdict {
    pub metric: Metric,
    pub pair: String,
    pub protocol: Option<Protocol>,
    /// `None` means the value could not be computed.
    pub observed: Option<f64>,
    pub bound: Bound,
    pub limit: f64,
    pub passed: bool,
    pub samples: usize,
    pub units_failed: usize,
}

impl fmt::Display for MetricVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{status}] {} {}", self.metric, self.pair)?;
        if let Some(protocol) = self.protocol {
            write!(f, " ({protocol})")?;
        }
        let op = match self.bound {
            Bound::Max => "<=",
            Bound::Min => ">=",
        };
        match self.observed {
            Some(value) => write!(f, ": {value:.3} {op} {}", self.limit)?,
            None => write!(f, ": unavailable {op} {}", self.limit)?,
        }
        if self.units_failed > 0 {
            write!(f, " ({} failed units)", self.units_failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignVerdict {
    pub passed: bool,
    pub verdicts: Vec<MetricVerdict>,
}

impl CampaignVerdict {
    pub fn failures(&self) -> impl Iterator<Item = &MetricVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }
}

fn judge(
    metric: Metric,
    pair: &str,
    protocol: Option<Protocol>,
    observed: MeanOf,
    bound: Bound,
    limit: f64,
    units_failed: usize,
) -> MetricVerdict {
    let within = match (observed.value, bound) {
        (Some(value), Bound::Max) => value <= limit,
        (Some(value), Bound::Min) => value >= limit,
        (None, _) => false,
    };
    MetricVerdict {
        metric,
        pair: pair.to_string(),
        protocol,
        observed: observed.value,
        bound,
        limit,
        passed: within && units_failed == 0,
        samples: observed.samples,
        units_failed,
    }
}

/// Judges every observation against the thresholds that are set.
pub fn evaluate(observations: &[MetricObservation], thresholds: &ThresholdSet) -> CampaignVerdict {
    let mut verdicts = Vec::new();

    for observation in observations {
        match observation {
            MetricObservation::Latency(agg) => {
                let checks = [
                    (Metric::Latency, agg.rtt_mean_ms, thresholds.max_latency_ms),
                    (
                        Metric::PacketLoss,
                        agg.packet_loss_percent,
                        thresholds.max_packet_loss_percent,
                    ),
                    (Metric::Jitter, agg.jitter_ms, thresholds.max_jitter_ms),
                ];
                for (metric, observed, limit) in checks {
                    if let Some(limit) = limit {
                        verdicts.push(judge(
                            metric,
                            &agg.pair,
                            None,
                            observed,
                            Bound::Max,
                            limit,
                            agg.units_failed,
                        ));
                    }
                }
            }
            MetricObservation::Throughput(agg) => {
                if let Some(limit) = thresholds.min_throughput_mbps {
                    verdicts.push(judge(
                        Metric::Throughput,
                        &agg.pair,
                        Some(agg.protocol),
                        agg.throughput_mbps,
                        Bound::Min,
                        limit,
                        agg.units_failed,
                    ));
                }
            }
        }
    }

    CampaignVerdict {
        passed: verdicts.iter().all(|v| v.passed),
        verdicts,
    }
}
