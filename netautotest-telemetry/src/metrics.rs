//! ## netautotest-telemetry::metrics
//! Prometheus registry for per-unit campaign measurements.
//!
//! Updates are fire-and-forget; the text exposition can be gathered at any
//! point or written to a file for a textfile collector.

use std::path::Path;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Outcome label for `netautotest_units_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    Failed,
    Interrupted,
}

impl UnitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Completed => "completed",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub rtt_mean: GaugeVec,
    pub jitter: GaugeVec,
    pub packet_loss: GaugeVec,
    pub throughput: GaugeVec,
    pub units: IntCounterVec,
    pub rtt_distribution: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let rtt_mean = GaugeVec::new(
            Opts::new(
                "netautotest_latency_rtt_mean_ms",
                "Mean round-trip time of the last latency session",
            ),
            &["pair"],
        )?;
        let jitter = GaugeVec::new(
            Opts::new(
                "netautotest_latency_jitter_ms",
                "Mean jitter of the last latency session",
            ),
            &["pair"],
        )?;
        let packet_loss = GaugeVec::new(
            Opts::new(
                "netautotest_latency_packet_loss_percent",
                "Probe loss of the last latency session",
            ),
            &["pair"],
        )?;
        let throughput = GaugeVec::new(
            Opts::new(
                "netautotest_throughput_mbps",
                "Throughput of the last throughput session",
            ),
            &["pair", "protocol"],
        )?;
        let units = IntCounterVec::new(
            Opts::new("netautotest_units_total", "Units of work by outcome"),
            &["outcome"],
        )?;
        let rtt_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "netautotest_probe_rtt_ms",
                "Round-trip time of individual probes",
            )
            .buckets(vec![0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1_000.0]),
        )?;

        registry.register(Box::new(rtt_mean.clone()))?;
        registry.register(Box::new(jitter.clone()))?;
        registry.register(Box::new(packet_loss.clone()))?;
        registry.register(Box::new(throughput.clone()))?;
        registry.register(Box::new(units.clone()))?;
        registry.register(Box::new(rtt_distribution.clone()))?;

        Ok(Self {
            registry,
            rtt_mean,
            jitter,
            packet_loss,
            throughput,
            units,
            rtt_distribution,
        })
    }

    /// Records one latency session. Absent statistics leave the gauges untouched.
    pub fn observe_latency(
        &self,
        pair: &str,
        rtt_mean_ms: Option<f64>,
        jitter_ms: Option<f64>,
        loss_percent: f64,
        rtt_samples_ms: &[f64],
    ) {
        if let Some(rtt) = rtt_mean_ms {
            self.rtt_mean.with_label_values(&[pair]).set(rtt);
        }
        if let Some(jitter) = jitter_ms {
            self.jitter.with_label_values(&[pair]).set(jitter);
        }
        self.packet_loss.with_label_values(&[pair]).set(loss_percent);
        for rtt in rtt_samples_ms {
            self.rtt_distribution.observe(*rtt);
        }
    }

    pub fn observe_throughput(&self, pair: &str, protocol: &str, mbps: f64) {
        self.throughput.with_label_values(&[pair, protocol]).set(mbps);
    }

    pub fn inc_units(&self, outcome: UnitOutcome) {
        self.units.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Writes the text exposition to `path`, replacing any previous content.
    pub fn write_to_file(&self, path: &Path) -> Result<(), prometheus::Error> {
        let text = self.gather_metrics()?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposition_contains_campaign_metrics() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.observe_latency("h2->h1", Some(12.5), Some(0.4), 5.0, &[12.0, 13.0]);
        metrics.observe_throughput("h2->h1", "tcp", 94.2);
        metrics.inc_units(UnitOutcome::Completed);
        metrics.inc_units(UnitOutcome::Failed);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("netautotest_latency_rtt_mean_ms{pair=\"h2->h1\"} 12.5"));
        assert!(text.contains("netautotest_latency_packet_loss_percent{pair=\"h2->h1\"} 5"));
        assert!(text.contains("netautotest_throughput_mbps{pair=\"h2->h1\",protocol=\"tcp\"} 94.2"));
        assert!(text.contains("netautotest_units_total{outcome=\"failed\"} 1"));
        assert!(text.contains("netautotest_probe_rtt_ms_count 2"));
    }

    #[test]
    fn test_missing_statistics_skip_gauges() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.observe_latency("h3->h1", None, None, 100.0, &[]);
        let text = metrics.gather_metrics().unwrap();
        assert!(!text.contains("netautotest_latency_rtt_mean_ms{"));
        assert!(text.contains("netautotest_latency_packet_loss_percent{pair=\"h3->h1\"} 100"));
    }

    #[test]
    fn test_write_to_file() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.inc_units(UnitOutcome::Interrupted);
        let path = std::env::temp_dir().join(format!("netautotest-metrics-{}.prom", std::process::id()));
        metrics.write_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(text.contains("outcome=\"interrupted\""));
    }
}
