//! # CLI
//!
//! Command-line and environment configuration surface of the controller.
//! Every switch has an environment fallback so the same binary works with
//! flag-based (Deployment args) and env-based (Helm values) installs.

use clap::{Parser, ValueEnum};

use crate::constants;

/// Global reload strategy choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReloadStrategyArg {
    /// Inject a fingerprint env var into every container (default)
    EnvVars,
    /// Stamp fingerprint annotations on the pod template
    Annotations,
}

/// Kubernetes controller that rolls workloads when the ConfigMaps or
/// Secrets they consume change.
#[derive(Debug, Clone, Parser)]
#[command(name = "reload-controller", version, about, long_about = None)]
pub struct ControllerOptions {
    /// Annotation prefix the controller recognizes on resources and workloads
    #[arg(
        long,
        env = "RELOADER_ANNOTATION_PREFIX",
        default_value = constants::DEFAULT_ANNOTATION_PREFIX
    )]
    pub annotation_prefix: String,

    /// Namespaces never reconciled, comma-separated
    #[arg(long, env = "RELOADER_IGNORE_NAMESPACES", value_delimiter = ',')]
    pub ignore_namespaces: Vec<String>,

    /// Workload kinds never reconciled (e.g. "jobs,cronjobs"), comma-separated
    #[arg(long, env = "RELOADER_IGNORE_WORKLOAD_KINDS", value_delimiter = ',')]
    pub ignore_workload_kinds: Vec<String>,

    /// Namespace label selector; may be repeated, a namespace is admitted
    /// when any selector matches
    #[arg(long = "namespace-selector", env = "RELOADER_NAMESPACE_SELECTOR")]
    pub namespace_selectors: Vec<String>,

    /// Label selector ConfigMaps/Secrets must satisfy to be considered
    #[arg(long, env = "RELOADER_RESOURCE_SELECTOR")]
    pub resource_selector: Option<String>,

    /// Reload workloads when a watched resource is created
    #[arg(long, env = "RELOADER_RELOAD_ON_CREATE")]
    pub reload_on_create: bool,

    /// Reload workloads when a watched resource is deleted
    #[arg(long, env = "RELOADER_RELOAD_ON_DELETE")]
    pub reload_on_delete: bool,

    /// Admit resource creations observed during controller startup
    #[arg(long, env = "RELOADER_SYNC_AFTER_RESTART")]
    pub sync_after_restart: bool,

    /// Treat every workload as if it carried the auto annotation
    #[arg(long, env = "RELOADER_AUTO_RELOAD_ALL")]
    pub auto_reload_all: bool,

    /// How the fingerprint is written into workloads
    #[arg(long, env = "RELOADER_RELOAD_STRATEGY", value_enum, default_value = "env-vars")]
    pub reload_strategy: ReloadStrategyArg,

    /// Webhook endpoint; when set, notifications replace workload mutation
    #[arg(long, env = "RELOADER_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Alert sink endpoint receiving a JSON message per successful reload
    #[arg(long, env = "RELOADER_ALERT_WEBHOOK_URL")]
    pub alert_webhook_url: Option<String>,

    /// Restrict all watches to a single namespace instead of cluster scope
    #[arg(long, env = "RELOADER_WATCHED_NAMESPACE")]
    pub watched_namespace: Option<String>,

    /// Watch Argo Rollouts (requires the Rollout CRD)
    #[arg(long, env = "RELOADER_ENABLE_ROLLOUTS")]
    pub enable_rollouts: bool,

    /// Watch OpenShift DeploymentConfigs (requires the DeploymentConfig API)
    #[arg(long, env = "RELOADER_ENABLE_DEPLOYMENTCONFIGS")]
    pub enable_deployment_configs: bool,

    /// Pause period applied to pause-capable workloads that do not carry
    /// their own pause-period annotation (e.g. "5m")
    #[arg(long, env = "RELOADER_DEFAULT_PAUSE_PERIOD")]
    pub default_pause_period: Option<String>,

    /// Emit per-namespace reload counters (high-cardinality, opt-in)
    #[arg(long, env = "RELOADER_METRICS_BY_NAMESPACE")]
    pub metrics_by_namespace: bool,

    /// Port of the metrics and probes HTTP server
    #[arg(long, env = "RELOADER_METRICS_PORT", default_value_t = constants::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Concurrent reconciliations per controlled kind
    #[arg(long, env = "RELOADER_CONCURRENCY", default_value_t = constants::DEFAULT_CONCURRENCY)]
    pub concurrency: u16,

    /// Cap on reconciliations dispatched per second across all source
    /// controllers (unlimited when unset)
    #[arg(long, env = "RELOADER_RECONCILE_QPS")]
    pub reconcile_qps: Option<f64>,

    /// Run behind a coordination.k8s.io Lease so only one replica reconciles
    #[arg(long, env = "RELOADER_ENABLE_LEADER_ELECTION")]
    pub enable_leader_election: bool,

    /// Leader-election lease name
    #[arg(long, env = "RELOADER_LEASE_NAME", default_value = constants::DEFAULT_LEASE_NAME)]
    pub lease_name: String,

    /// Namespace holding the leader-election lease; defaults to the pod namespace
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub lease_namespace: String,

    /// Leader-election lease duration in seconds
    #[arg(long, env = "RELOADER_LEASE_DURATION_SECS", default_value_t = constants::DEFAULT_LEASE_DURATION_SECS)]
    pub lease_duration_secs: u64,

    /// Leader-election renew deadline in seconds
    #[arg(long, env = "RELOADER_LEASE_RENEW_SECS", default_value_t = constants::DEFAULT_LEASE_RENEW_SECS)]
    pub lease_renew_secs: u64,

    /// Leader-election retry period in seconds
    #[arg(long, env = "RELOADER_LEASE_RETRY_SECS", default_value_t = constants::DEFAULT_LEASE_RETRY_SECS)]
    pub lease_retry_secs: u64,
}
