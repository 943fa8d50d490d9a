//! # Matcher
//!
//! Decides whether a changed ConfigMap/Secret is consumed by a candidate
//! workload. Pure: it operates on already-fetched objects and performs no
//! I/O, so property tests can enumerate synthetic workloads exhaustively.
//!
//! Evaluation order, first match wins:
//! 1. explicit name list (`configmap-reload` / `secret-reload` annotation),
//! 2. search pairing (`search` on the workload, `match` on the resource),
//! 3. auto discovery of pod-template references (volumes, envFrom, env),
//!    gated on the `auto` annotation or the global auto-reload-all switch.

use k8s_openapi::api::core::v1::{Container, Volume};

use crate::config::Config;
use crate::workload::Workload;

/// The two source resource types the controller watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    ConfigMap,
    Secret,
}

impl SourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::ConfigMap => "ConfigMap",
            SourceType::Secret => "Secret",
        }
    }
}

/// A changed source resource, reduced to what matching and reload need.
///
/// `match_enabled` mirrors the resource's `match` annotation; the matcher
/// stays pure by having the reconciler resolve it before calling in.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub kind: SourceType,
    pub name: String,
    pub namespace: String,
    pub hash: String,
    pub match_enabled: bool,
}

impl SourceRef {
    /// Provenance string stamped on reloaded workloads,
    /// e.g. `ConfigMap/ns-x/cm-a`.
    #[must_use]
    pub fn provenance(&self) -> String {
        format!("{}/{}/{}", self.kind.as_str(), self.namespace, self.name)
    }
}

/// Why a workload was selected for reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    ExplicitNameMatch,
    ExplicitSearchMatch,
    AutoDiscoveredVolume,
    AutoDiscoveredEnvFrom,
    AutoDiscoveredEnv,
}

impl MatchReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchReason::ExplicitNameMatch => "explicit-name-match",
            MatchReason::ExplicitSearchMatch => "explicit-search-match",
            MatchReason::AutoDiscoveredVolume => "auto-discovered-volume",
            MatchReason::AutoDiscoveredEnvFrom => "auto-discovered-envfrom",
            MatchReason::AutoDiscoveredEnv => "auto-discovered-env",
        }
    }
}

/// Outcome of matching one workload against one changed resource.
#[derive(Debug, Clone)]
pub struct ReloadDecision {
    pub workload: Workload,
    pub reason: MatchReason,
    pub hash: String,
    pub auto_reload: bool,
}

/// Evaluate a candidate workload against a changed resource.
///
/// Never emits a decision across namespaces.
#[must_use]
pub fn match_workload(
    source: &SourceRef,
    workload: &Workload,
    config: &Config,
) -> Option<ReloadDecision> {
    if workload.namespace() != source.namespace {
        return None;
    }

    let annotations = workload.annotations();
    let keys = &config.annotations;

    // 1. Explicit name list
    let list_key = match source.kind {
        SourceType::ConfigMap => &keys.configmap_reload,
        SourceType::Secret => &keys.secret_reload,
    };
    if let Some(list) = annotations.get(list_key) {
        if list.split(',').any(|name| name.trim() == source.name) {
            return Some(decision(workload, source, MatchReason::ExplicitNameMatch, false));
        }
    }

    // 2. Search pairing
    if annotation_true(annotations.get(&keys.search)) && source.match_enabled {
        return Some(decision(workload, source, MatchReason::ExplicitSearchMatch, false));
    }

    // 3. Auto discovery
    if annotation_true(annotations.get(&keys.auto)) || config.auto_reload_all {
        if let Some(reason) = discover_reference(source, workload) {
            return Some(decision(workload, source, reason, true));
        }
    }

    None
}

fn decision(
    workload: &Workload,
    source: &SourceRef,
    reason: MatchReason,
    auto_reload: bool,
) -> ReloadDecision {
    ReloadDecision {
        workload: workload.clone(),
        reason,
        hash: source.hash.clone(),
        auto_reload,
    }
}

fn annotation_true(value: Option<&String>) -> bool {
    value.is_some_and(|v| v == "true")
}

/// Scan the pod template for a reference to the source resource.
/// Volumes take precedence over envFrom, which takes precedence over env.
fn discover_reference(source: &SourceRef, workload: &Workload) -> Option<MatchReason> {
    if workload.volumes().iter().any(|v| volume_references(source, v)) {
        return Some(MatchReason::AutoDiscoveredVolume);
    }

    let containers = workload
        .containers()
        .iter()
        .chain(workload.init_containers().iter());
    let mut env_hit = false;
    for container in containers {
        if envfrom_references(source, container) {
            return Some(MatchReason::AutoDiscoveredEnvFrom);
        }
        env_hit = env_hit || env_references(source, container);
    }
    env_hit.then_some(MatchReason::AutoDiscoveredEnv)
}

fn volume_references(source: &SourceRef, volume: &Volume) -> bool {
    match source.kind {
        SourceType::ConfigMap => {
            if volume
                .config_map
                .as_ref()
                .map(|cm| cm.name.as_str())
                == Some(source.name.as_str())
            {
                return true;
            }
        }
        SourceType::Secret => {
            if volume
                .secret
                .as_ref()
                .and_then(|s| s.secret_name.as_deref())
                == Some(source.name.as_str())
            {
                return true;
            }
        }
    }

    // Projected volumes enumerate sources individually
    volume
        .projected
        .as_ref()
        .and_then(|p| p.sources.as_ref())
        .is_some_and(|sources| {
            sources.iter().any(|projection| match source.kind {
                SourceType::ConfigMap => {
                    projection
                        .config_map
                        .as_ref()
                        .map(|cm| cm.name.as_str())
                        == Some(source.name.as_str())
                }
                SourceType::Secret => {
                    projection
                        .secret
                        .as_ref()
                        .map(|s| s.name.as_str())
                        == Some(source.name.as_str())
                }
            })
        })
}

fn envfrom_references(source: &SourceRef, container: &Container) -> bool {
    container.env_from.as_ref().is_some_and(|env_from| {
        env_from.iter().any(|e| match source.kind {
            SourceType::ConfigMap => {
                e.config_map_ref
                    .as_ref()
                    .map(|r| r.name.as_str())
                    == Some(source.name.as_str())
            }
            SourceType::Secret => {
                e.secret_ref.as_ref().map(|r| r.name.as_str())
                    == Some(source.name.as_str())
            }
        })
    })
}

fn env_references(source: &SourceRef, container: &Container) -> bool {
    container.env.as_ref().is_some_and(|env| {
        env.iter()
            .filter_map(|e| e.value_from.as_ref())
            .any(|value_from| match source.kind {
                SourceType::ConfigMap => {
                    value_from
                        .config_map_key_ref
                        .as_ref()
                        .map(|r| r.name.as_str())
                        == Some(source.name.as_str())
                }
                SourceType::Secret => {
                    value_from
                        .secret_key_ref
                        .as_ref()
                        .map(|r| r.name.as_str())
                        == Some(source.name.as_str())
                }
            })
    })
}
