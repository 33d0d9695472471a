//! # Constants
//!
//! Defaults shared by the controller configuration and runtime.

/// Default port for the metrics and probe HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Maximum time to wait for the HTTP server to bind before startup fails
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server to become ready
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before restarting a failed watch stream
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Config version handed to provider factories
pub const DEFAULT_CONFIG_VERSION: &str = "0.1.0";

/// Directory searched for external provider plugins
pub const DEFAULT_PLUGIN_DIRECTORY: &str = "/var/lib/key-management-controller/plugins";

/// Upper bound on entries held by the process-wide cache
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// How often the cache janitor purges expired entries
pub const DEFAULT_CACHE_JANITOR_INTERVAL_SECS: u64 = 30;

/// Length bound for `briefError` before the `...` suffix is appended
pub const MAX_BRIEF_ERROR_LENGTH: usize = 30;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "key-management-controller";

/// Annotation bumped by `kmsctl reconcile` to force a reconciliation
pub const RECONCILE_ANNOTATION: &str = "trust-management.microscaler.io/reconcile";
