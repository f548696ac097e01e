//! ## gatewarden-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! ### Components:
//! - `EventLogger::init`: process-wide `fmt` subscriber with `EnvFilter`
//! - `EventLogger::log_event`: ban/unban audit records under a
//!   `security_event` span

use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Install the global subscriber. `RUST_LOG` wins over `default_level`.
    ///
    /// Calling this twice is harmless; the second subscriber is discarded.
    pub fn init(default_level: &str) {
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::NONE)
            .try_init();
    }

    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "security_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            tracing::info!(
                metadata = ?metadata,
                "Security event occurred"
            );
        }
        .instrument(span)
        .await
    }
}
