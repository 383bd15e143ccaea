//! ## netautotest-telemetry::logging
//! Structured logging with tracing and OpenTelemetry attributes.
//!
//! `RUST_LOG` takes precedence over the configured level.

use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Returns `false` if one was already set.
    pub fn init(level: &str) -> bool {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init()
            .is_ok()
    }

    /// Emits one campaign event (state transition, unit failure, verdict).
    #[inline]
    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "campaign_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            tracing::info!(
                metadata = ?metadata,
                "Campaign event recorded"
            );
        }
        .instrument(span)
        .await
    }
}
