//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when RUST_LOG is unset.
const DEFAULT_DIRECTIVES: &str = "info,vigil=debug";

/// Output format, selected from the RUST_ENV variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// Machine-readable JSON lines, one event per line.
    Json,
    /// Human-readable multi-line output for local runs.
    Pretty,
}

impl LogFormat {
    fn from_env(rust_env: Option<&str>) -> Self {
        match rust_env {
            Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// RUST_LOG overrides the default directives; RUST_ENV=production
/// switches to JSON output. Fails if a subscriber is already set.
pub fn init_logging() -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let format = LogFormat::from_env(std::env::var("RUST_ENV").ok().as_deref());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true).with_thread_names(true))
            .try_init(),
    };

    result.map_err(|err| TelemetryError::LoggingInit(err.to_string()))
}
