//! Tracing subscriber setup.

use crate::cli::LogFormat;

/// Initialize the global tracing subscriber from `RUST_LOG`, falling back
/// to `kubetruth_controller=info` when it isn't set. `format` chooses
/// between human-readable output and newline-delimited JSON for log
/// aggregators.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kubetruth_controller=info".into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
