//! Logging and metrics initialization.
//!
//! Logging writes to stderr, never stdout: the stdio tool-RPC facade speaks
//! newline-framed JSON on stdout, and a stray log line there would corrupt
//! the protocol.

mod metrics;

pub use metrics::PrometheusHandle;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber. Respects `RUST_LOG`,
/// defaulting to `info` when unset. Safe to call at most once per process;
/// a second call is a silent no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}

/// Initializes the process-wide Prometheus metrics recorder, returning a
/// handle the HTTP facade can render at `/metrics`.
///
/// # Errors
///
/// Returns [`crate::Error::Storage`] if a recorder is already installed.
pub fn init_metrics() -> crate::Result<PrometheusHandle> {
    metrics::install()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
