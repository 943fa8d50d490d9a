//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default annotation prefix; every annotation the controller recognizes
/// lives under this domain
pub const DEFAULT_ANNOTATION_PREFIX: &str = "reloader.microscaler.io";

/// Field-manager identity used for all workload writes
pub const FIELD_MANAGER: &str = "reload-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Number of hex characters kept from the SHA-256 digest of a resource's
/// data; 16 chars = 64 bits, collision-safe for realistic fleet sizes
pub const CONTENT_HASH_LEN: usize = 16;

/// Prefix of every env var the controller injects into containers
pub const ENV_VAR_PREFIX: &str = "RELOADER_";

/// Suffix of injected env vars sourced from a ConfigMap
pub const ENV_VAR_CONFIGMAP_SUFFIX: &str = "_CONFIGMAP";

/// Suffix of injected env vars sourced from a Secret
pub const ENV_VAR_SECRET_SUFFIX: &str = "_SECRET";

/// Maximum number of attempts for a conflicted workload write
pub const UPDATE_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for the conflict retry backoff (milliseconds)
pub const UPDATE_RETRY_BASE_MS: u64 = 100;

/// Upper bound for the conflict retry backoff (milliseconds)
pub const UPDATE_RETRY_MAX_MS: u64 = 5_000;

/// Default number of concurrent reconciliations per controlled kind
pub const DEFAULT_CONCURRENCY: u16 = 4;

/// Default webhook/alert send timeout (seconds)
pub const OUTBOUND_SEND_TIMEOUT_SECS: u64 = 10;

/// Annotation stamped on Jobs instantiated from a CronJob template,
/// matching `kubectl create job --from=cronjob/<name>`
pub const CRONJOB_INSTANTIATE_ANNOTATION: &str = "cronjob.kubernetes.io/instantiate";

/// Default leader-election lease name
pub const DEFAULT_LEASE_NAME: &str = "reload-controller-leader";

/// Default leader-election lease duration (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader-election renew deadline (seconds)
pub const DEFAULT_LEASE_RENEW_SECS: u64 = 10;

/// Default leader-election retry period (seconds)
pub const DEFAULT_LEASE_RETRY_SECS: u64 = 2;
