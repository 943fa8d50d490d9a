//! # Reload Strategies
//!
//! How a content fingerprint is written into a workload so the
//! orchestrator rolls new pods. Two strategies exist, selected per
//! workload (annotation override) with a configured global default:
//!
//! - **env-vars**: every container (including init containers) gets a
//!   controller-managed env var whose value is the fingerprint;
//! - **annotations**: the fingerprint is stamped on the pod template.
//!
//! Rollouts additionally understand the `restart` override, which stamps
//! the Rollout `restartAt` timestamp instead of touching the template.
//!
//! Application is pure in-memory mutation; it returns whether anything
//! changed, which is what makes the pipeline idempotent: a workload that
//! already encodes the current fingerprint produces `false` and the
//! driver skips the write.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::EnvVar;

use crate::config::AnnotationSet;
use crate::constants::{ENV_VAR_CONFIGMAP_SUFFIX, ENV_VAR_PREFIX, ENV_VAR_SECRET_SUFFIX};
use crate::matcher::{SourceRef, SourceType};
use crate::workload::{Workload, WorkloadKind};

/// The strategies a workload can be reloaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStrategy {
    EnvVars,
    Annotations,
    /// Rollout-only: stamp `restartAt` instead of mutating the template
    Restart,
}

impl ReloadStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadStrategy::EnvVars => "env-vars",
            ReloadStrategy::Annotations => "annotations",
            ReloadStrategy::Restart => "restart",
        }
    }
}

impl fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReloadStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "env-vars" | "env-var" => Ok(ReloadStrategy::EnvVars),
            "annotations" | "annotation" => Ok(ReloadStrategy::Annotations),
            "restart" => Ok(ReloadStrategy::Restart),
            _ => Err(()),
        }
    }
}

/// Resolve the strategy for a workload: annotation override wins over the
/// global default. Malformed overrides are ignored; `restart` is honored
/// only on Rollouts.
#[must_use]
pub fn select_strategy(
    workload: &Workload,
    global: ReloadStrategy,
    keys: &AnnotationSet,
) -> ReloadStrategy {
    let override_strategy = workload
        .annotations()
        .get(&keys.reload_strategy)
        .and_then(|v| ReloadStrategy::from_str(v).ok());
    match override_strategy {
        Some(ReloadStrategy::Restart) if workload.kind() != WorkloadKind::Rollout => global,
        Some(strategy) => strategy,
        None => global,
    }
}

/// Name of the controller-managed env var for a source resource:
/// uppercase, non-alphanumerics mapped to `_`, with a per-type suffix.
/// `my-config` becomes `RELOADER_MY_CONFIG_CONFIGMAP`.
#[must_use]
pub fn env_var_name(source: &SourceRef) -> String {
    let sanitized: String = source
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    let suffix = match source.kind {
        SourceType::ConfigMap => ENV_VAR_CONFIGMAP_SUFFIX,
        SourceType::Secret => ENV_VAR_SECRET_SUFFIX,
    };
    format!("{ENV_VAR_PREFIX}{sanitized}{suffix}")
}

/// Apply the strategy to an in-memory workload. Returns whether the
/// workload changed; `false` means it already encodes the fingerprint.
pub fn apply(
    workload: &mut Workload,
    source: &SourceRef,
    strategy: ReloadStrategy,
    keys: &AnnotationSet,
) -> bool {
    match strategy {
        ReloadStrategy::EnvVars => apply_env_vars(workload, source, keys),
        ReloadStrategy::Annotations => apply_annotations(workload, source, keys),
        ReloadStrategy::Restart => apply_restart(workload, source, keys),
    }
}

fn apply_env_vars(workload: &mut Workload, source: &SourceRef, keys: &AnnotationSet) -> bool {
    let name = env_var_name(source);
    let Some(template) = workload.pod_template_mut() else {
        return false;
    };
    let Some(pod_spec) = template.spec.as_mut() else {
        return false;
    };

    let mut changed = false;
    let init_containers = pod_spec.init_containers.iter_mut().flatten();
    for container in pod_spec.containers.iter_mut().chain(init_containers) {
        let env = container.env.get_or_insert_with(Vec::new);
        if let Some(index) = env.iter().position(|e| e.name == name) {
            let existing = &mut env[index];
            if existing.value.as_deref() != Some(source.hash.as_str()) {
                existing.value = Some(source.hash.clone());
                existing.value_from = None;
                changed = true;
            }
        } else {
            // Appended at the end so injection order stays deterministic
            env.push(EnvVar {
                name: name.clone(),
                value: Some(source.hash.clone()),
                value_from: None,
            });
            changed = true;
        }
    }

    if changed {
        let annotations = template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(Default::default);
        annotations.insert(keys.last_reloaded_from.clone(), source.provenance());
    }
    changed
}

fn apply_annotations(workload: &mut Workload, source: &SourceRef, keys: &AnnotationSet) -> bool {
    let provenance = source.provenance();
    let Some(template) = workload.pod_template_mut() else {
        return false;
    };
    let annotations = template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default);

    let mut changed = false;
    if annotations.get(&keys.last_reloaded_at).map(String::as_str) != Some(source.hash.as_str()) {
        annotations.insert(keys.last_reloaded_at.clone(), source.hash.clone());
        changed = true;
    }
    if annotations.get(&keys.last_reloaded_from).map(String::as_str) != Some(provenance.as_str()) {
        annotations.insert(keys.last_reloaded_from.clone(), provenance);
        changed = true;
    }
    changed
}

/// Restart strategy keeps its fingerprint on the workload's own
/// annotations (the template is deliberately untouched) and bumps
/// `restartAt` only when the fingerprint moved.
fn apply_restart(workload: &mut Workload, source: &SourceRef, keys: &AnnotationSet) -> bool {
    if workload
        .annotations()
        .get(&keys.last_reloaded_at)
        .map(String::as_str)
        == Some(source.hash.as_str())
    {
        return false;
    }

    let provenance = source.provenance();
    let annotations = workload.annotations_mut();
    annotations.insert(keys.last_reloaded_at.clone(), source.hash.clone());
    annotations.insert(keys.last_reloaded_from.clone(), provenance);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    workload.set_restart_at(&now);
    true
}
