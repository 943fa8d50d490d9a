//! # Runtime Configuration
//!
//! Resolves the CLI/env surface into the immutable configuration carried
//! by every reconciler, with the annotation set expanded under the
//! configured prefix and all selectors parsed up front so reconcilers
//! never re-parse per event.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::cli::{ControllerOptions, ReloadStrategyArg};
use crate::selector::Selector;
use crate::strategy::ReloadStrategy;
use crate::workload::WorkloadKind;

/// Fully-qualified annotation keys under the configured prefix.
///
/// All keys share one prefix; the `match` annotation sits on
/// ConfigMaps/Secrets, everything else on workloads, except `paused-at`
/// and the provenance stamps which the controller writes itself.
#[derive(Debug, Clone)]
pub struct AnnotationSet {
    pub prefix: String,
    /// Comma-separated ConfigMap names a workload watches
    pub configmap_reload: String,
    /// Comma-separated Secret names a workload watches
    pub secret_reload: String,
    /// "true" opts a workload into auto-discovery of referenced resources
    pub auto: String,
    /// "true" on a workload pairs with `match` on resources
    pub search: String,
    /// "true" on a ConfigMap/Secret makes it eligible for search pairing
    pub match_resource: String,
    /// "true" on a ConfigMap/Secret excludes it from processing entirely
    pub ignore: String,
    /// Per-workload strategy override (env-vars | annotations | restart)
    pub reload_strategy: String,
    /// Pause duration applied to the workload after a reload
    pub pause_period: String,
    /// Timestamp stamped when the controller pauses a workload
    pub paused_at: String,
    /// Provenance: which resource triggered the last reload
    pub last_reloaded_from: String,
    /// Fingerprint stamped by the annotation strategy
    pub last_reloaded_at: String,
}

impl AnnotationSet {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        let key = |suffix: &str| format!("{prefix}/{suffix}");
        Self {
            configmap_reload: key("configmap-reload"),
            secret_reload: key("secret-reload"),
            auto: key("auto"),
            search: key("search"),
            match_resource: key("match"),
            ignore: key("ignore"),
            reload_strategy: key("reload-strategy"),
            pause_period: key("pause-period"),
            paused_at: key("paused-at"),
            last_reloaded_from: key("last-reloaded-from"),
            last_reloaded_at: key("last-reloaded-at"),
            prefix,
        }
    }
}

/// Immutable controller configuration, shared via `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub annotations: AnnotationSet,
    pub ignored_namespaces: HashSet<String>,
    pub ignored_workload_kinds: HashSet<WorkloadKind>,
    pub namespace_selectors: Vec<Selector>,
    pub resource_selector: Selector,
    pub reload_on_create: bool,
    pub reload_on_delete: bool,
    pub sync_after_restart: bool,
    pub auto_reload_all: bool,
    pub reload_strategy: ReloadStrategy,
    pub webhook_url: Option<String>,
    pub alert_webhook_url: Option<String>,
    pub watched_namespace: Option<String>,
    pub enable_rollouts: bool,
    pub enable_deployment_configs: bool,
    pub default_pause_period: Option<Duration>,
    pub metrics_by_namespace: bool,
    pub metrics_port: u16,
    pub concurrency: u16,
    pub reconcile_qps: Option<f64>,
    pub enable_leader_election: bool,
    pub lease_name: String,
    pub lease_namespace: String,
    pub lease_duration: Duration,
    pub lease_renew: Duration,
    pub lease_retry: Duration,
}

impl Config {
    /// Resolve CLI options into the runtime configuration.
    pub fn from_options(opts: &ControllerOptions) -> Result<Self> {
        let ignored_namespaces = opts
            .ignore_namespaces
            .iter()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .collect();

        let mut ignored_workload_kinds = HashSet::new();
        for kind in &opts.ignore_workload_kinds {
            if kind.trim().is_empty() {
                continue;
            }
            let kind = WorkloadKind::from_str(kind)
                .with_context(|| format!("invalid --ignore-workload-kinds entry {kind:?}"))?;
            ignored_workload_kinds.insert(kind);
        }

        let namespace_selectors = opts
            .namespace_selectors
            .iter()
            .map(|s| {
                Selector::from_str(s)
                    .with_context(|| format!("invalid --namespace-selector {s:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let resource_selector = opts
            .resource_selector
            .as_deref()
            .unwrap_or_default()
            .parse::<Selector>()
            .with_context(|| {
                format!("invalid --resource-selector {:?}", opts.resource_selector)
            })?;

        let default_pause_period = opts
            .default_pause_period
            .as_deref()
            .map(|p| {
                parse_duration(p)
                    .with_context(|| format!("invalid --default-pause-period {p:?}"))
            })
            .transpose()?;

        let reload_strategy = match opts.reload_strategy {
            ReloadStrategyArg::EnvVars => ReloadStrategy::EnvVars,
            ReloadStrategyArg::Annotations => ReloadStrategy::Annotations,
        };

        Ok(Self {
            annotations: AnnotationSet::new(&opts.annotation_prefix),
            ignored_namespaces,
            ignored_workload_kinds,
            namespace_selectors,
            resource_selector,
            reload_on_create: opts.reload_on_create,
            reload_on_delete: opts.reload_on_delete,
            sync_after_restart: opts.sync_after_restart,
            auto_reload_all: opts.auto_reload_all,
            reload_strategy,
            webhook_url: opts.webhook_url.clone(),
            alert_webhook_url: opts.alert_webhook_url.clone(),
            watched_namespace: opts.watched_namespace.clone(),
            enable_rollouts: opts.enable_rollouts,
            enable_deployment_configs: opts.enable_deployment_configs,
            default_pause_period,
            metrics_by_namespace: opts.metrics_by_namespace,
            metrics_port: opts.metrics_port,
            concurrency: opts.concurrency.max(1),
            reconcile_qps: opts.reconcile_qps.filter(|qps| *qps > 0.0),
            enable_leader_election: opts.enable_leader_election,
            lease_name: opts.lease_name.clone(),
            lease_namespace: opts.lease_namespace.clone(),
            lease_duration: Duration::from_secs(opts.lease_duration_secs),
            lease_renew: Duration::from_secs(opts.lease_renew_secs),
            lease_retry: Duration::from_secs(opts.lease_retry_secs),
        })
    }

    /// The namespace ignore-list dominates every other filter.
    #[must_use]
    pub fn is_namespace_ignored(&self, namespace: &str) -> bool {
        self.ignored_namespaces.contains(namespace)
    }

    /// Whether the namespace selector cache participates in filtering.
    #[must_use]
    pub fn namespace_selectors_enabled(&self) -> bool {
        !self.namespace_selectors.is_empty()
    }

    /// Kinds the workload registry lists, after ignore-list and feature flags.
    #[must_use]
    pub fn enabled_workload_kinds(&self) -> Vec<WorkloadKind> {
        let all = [
            WorkloadKind::Deployment,
            WorkloadKind::DaemonSet,
            WorkloadKind::StatefulSet,
            WorkloadKind::Job,
            WorkloadKind::CronJob,
            WorkloadKind::Rollout,
            WorkloadKind::DeploymentConfig,
        ];
        all.into_iter()
            .filter(|kind| !self.ignored_workload_kinds.contains(kind))
            .filter(|kind| match kind {
                WorkloadKind::Rollout => self.enable_rollouts,
                WorkloadKind::DeploymentConfig => self.enable_deployment_configs,
                _ => true,
            })
            .collect()
    }
}

/// Parse a Kubernetes-style duration such as "30s", "5m", "1h30m", "2d".
///
/// Units: s, m, h, d. Concatenated groups are summed.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("duration string cannot be empty"));
    }

    let group = Regex::new(r"(?P<number>\d+)(?P<unit>[smhd])")
        .map_err(|e| anyhow::anyhow!("failed to compile regex: {e}"))?;

    let mut total_secs: u64 = 0;
    let mut matched_len = 0;
    for captures in group.captures_iter(&trimmed) {
        let number: u64 = captures["number"].parse().with_context(|| {
            format!("invalid duration number in {duration_str:?}")
        })?;
        let unit_secs = match &captures["unit"] {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86400,
            _ => unreachable!("regex only matches smhd"),
        };
        total_secs = total_secs
            .checked_add(number.saturating_mul(unit_secs))
            .ok_or_else(|| anyhow::anyhow!("duration {duration_str:?} overflows"))?;
        matched_len += captures[0].len();
    }

    if matched_len != trimmed.len() || total_secs == 0 {
        return Err(anyhow::anyhow!(
            "invalid duration format {duration_str:?}; expected e.g. \"30s\", \"5m\", \"1h30m\""
        ));
    }

    Ok(Duration::from_secs(total_secs))
}
