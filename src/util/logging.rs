//! Logging initialization.

use crate::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when it is set and parses.
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(level: &str, format: &LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init().is_ok(),
    }
}
