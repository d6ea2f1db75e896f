//! Logging and tracing utilities
//!
//! Logs go to stderr so that stdout stays free for reports and JSON output.
//! The filter is read from `TRADEGRAPH_LOG`, then `RUST_LOG`, else `info`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter directive
pub const LOG_ENV: &str = "TRADEGRAPH_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with human-readable output
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize tracing emitting one JSON object per event
pub fn init_tracing_json() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}
