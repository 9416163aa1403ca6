//! # Error Types
//!
//! Typed error kinds for the reconciliation core (see spec §7). Transport
//! and infrastructure glue (CLI, HTTP server, client bootstrap) uses
//! `anyhow::Result` with `.context(...)`, matching the rest of this crate;
//! the reconciler itself propagates these typed variants so callers can
//! classify failures (for logging fields and metric labels) without string
//! matching.

use thiserror::Error;

/// Errors surfaced by the reconciliation core.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The `ProjectMapping` set fetched from the cluster has no `root` spec,
    /// or more than one. The tick becomes a no-op.
    #[error("config error: {0}")]
    Config(String),

    /// Failure reading projects/parameters from the `ParameterSource`.
    #[error("source error: {0}")]
    Source(String),

    /// Any other `ClusterGateway` transport failure.
    #[error("cluster error: {0}")]
    Cluster(#[from] kube::Error),

    /// A template failed to render or referenced a missing context key.
    #[error("template error: {0}")]
    Template(String),

    /// The target resource exists but isn't under this controller's
    /// management (informational, not a hard failure).
    #[error("resource not under kubetruth management: {kind} {namespace}/{name}")]
    ManagementConflict {
        kind: String,
        namespace: String,
        name: String,
    },

    /// A rendered manifest couldn't be parsed as structured YAML/JSON.
    #[error("manifest parse error: {0}")]
    ManifestParse(String),
}

impl ReconcileError {
    /// Short, stable label for metrics (`reconcile_errors_total{kind=...}`)
    /// and structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Config(_) => "config",
            ReconcileError::Source(_) => "source",
            ReconcileError::Cluster(_) => "cluster",
            ReconcileError::Template(_) => "template",
            ReconcileError::ManagementConflict { .. } => "management_conflict",
            ReconcileError::ManifestParse(_) => "manifest_parse",
        }
    }
}
