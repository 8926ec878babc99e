//! Tracing subscriber setup
//!
//! Logs go to stderr; stdout is reserved for protocol replies.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive
pub const LOG_ENV: &str = "GRID_WORKER_LOG";

/// Install the global fmt subscriber
///
/// `level` wins over `GRID_WORKER_LOG`; with neither set the filter is `info`.
pub fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
