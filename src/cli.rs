//! # Controller Settings
//!
//! Command-line/environment configuration for the `kubetruth-controller`
//! binary. Every flag doubles as an environment variable so the controller
//! is easy to configure purely from a Kubernetes `Deployment` spec.

use clap::Parser;

use crate::constants::DEFAULT_POLL_INTERVAL_SECS;

/// Settings for the `kubetruth-controller` daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "kubetruth-controller")]
#[command(about = "Projects CloudTruth parameters into Kubernetes ConfigMaps and Secrets", long_about = None)]
pub struct Settings {
    /// Namespace generated resources default into when a ProjectMapping
    /// doesn't set `resourceNamespace`.
    #[arg(long, env = "KUBETRUTH_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Seconds between reconciliation ticks.
    #[arg(long, env = "KUBETRUTH_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Render and log manifests without applying them to the cluster.
    #[arg(long, env = "KUBETRUTH_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// CloudTruth API key. Required unless running with a fake source in
    /// tests.
    #[arg(long, env = "CLOUDTRUTH_API_KEY")]
    pub cloudtruth_api_key: Option<String>,

    /// Port the health/metrics HTTP server listens on.
    #[arg(long, env = "KUBETRUTH_SERVER_PORT", default_value_t = crate::constants::DEFAULT_SERVER_PORT)]
    pub server_port: u16,

    /// Log output format.
    #[arg(long, env = "KUBETRUTH_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Structured log output format, selected via `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}
