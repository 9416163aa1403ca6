//! Shared constants for the controller.

/// Annotation/label applied to every resource this controller writes, used
/// by `under_management?` to avoid clobbering unrelated resources.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kubetruth";

/// Field manager name used for server-side apply.
pub const FIELD_MANAGER: &str = "kubetruth-controller";

/// Default poll interval when `--poll-interval` is not given.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default port for the health/metrics HTTP server.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind before giving up on startup.
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
