//! Logging initialization.
//!
//! Structured `tracing` output to stdout; level comes from `RUST_LOG`
//! when set, otherwise from the configured level. JSON formatting is
//! available for log shippers.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops (relevant for
/// tests that share a process).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
    Ok(())
}
