//! # Workload Registry
//!
//! Kind-by-kind cluster access for workloads: listing every enabled kind
//! in a namespace for the matcher, plus get/replace primitives the retry
//! driver uses. Kinds on the ignore list are never listed; Rollouts and
//! DeploymentConfigs are only listed behind their feature flags, and a
//! missing CRD (HTTP 404) degrades to a warning instead of failing the
//! reconcile.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use tracing::warn;

use crate::config::Config;
use crate::constants::FIELD_MANAGER;
use crate::workload::{DeploymentConfig, Rollout, Workload, WorkloadKind};

#[derive(Clone)]
pub struct WorkloadRegistry {
    client: Client,
    config: Arc<Config>,
}

impl std::fmt::Debug for WorkloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRegistry")
            .field("enabled_kinds", &self.config.enabled_workload_kinds())
            .finish_non_exhaustive()
    }
}

impl WorkloadRegistry {
    #[must_use]
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// List every workload of every enabled kind in a namespace.
    pub async fn list_namespace(&self, namespace: &str) -> Result<Vec<Workload>, kube::Error> {
        let mut workloads = Vec::new();
        for kind in self.config.enabled_workload_kinds() {
            match self.list_kind(kind, namespace).await {
                Ok(mut items) => workloads.append(&mut items),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    // CRD-backed kind enabled but API not served
                    warn!(
                        "Skipping {} in {}: API not available ({})",
                        kind, namespace, ae.message
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(workloads)
    }

    async fn list_kind(
        &self,
        kind: WorkloadKind,
        namespace: &str,
    ) -> Result<Vec<Workload>, kube::Error> {
        let lp = ListParams::default();
        let client = self.client.clone();
        let items = match kind {
            WorkloadKind::Deployment => Api::<Deployment>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::DaemonSet => Api::<DaemonSet>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::StatefulSet => Api::<StatefulSet>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::Job => Api::<Job>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::CronJob => Api::<CronJob>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::Rollout => Api::<Rollout>::namespaced(client, namespace)
                .list(&lp)
                .await?
                .items
                .into_iter()
                .map(Workload::from)
                .collect(),
            WorkloadKind::DeploymentConfig => {
                Api::<DeploymentConfig>::namespaced(client, namespace)
                    .list(&lp)
                    .await?
                    .items
                    .into_iter()
                    .map(Workload::from)
                    .collect()
            }
        };
        Ok(items)
    }
}

/// Fetch one workload by kind and key; `None` when it no longer exists.
pub async fn get_workload(
    client: &Client,
    kind: WorkloadKind,
    namespace: &str,
    name: &str,
) -> Result<Option<Workload>, kube::Error> {
    let client = client.clone();
    let workload = match kind {
        WorkloadKind::Deployment => Api::<Deployment>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::DaemonSet => Api::<DaemonSet>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::StatefulSet => Api::<StatefulSet>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::Job => Api::<Job>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::CronJob => Api::<CronJob>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::Rollout => Api::<Rollout>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
        WorkloadKind::DeploymentConfig => Api::<DeploymentConfig>::namespaced(client, namespace)
            .get_opt(name)
            .await?
            .map(Workload::from),
    };
    Ok(workload)
}

/// Replace a workload in place with the controller's field-manager identity.
pub async fn replace_workload(client: &Client, workload: &Workload) -> Result<(), kube::Error> {
    let pp = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    };
    let namespace = workload.namespace().to_string();
    let name = workload.name().to_string();
    let client = client.clone();
    match workload {
        Workload::Deployment(w) => {
            Api::<Deployment>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::DaemonSet(w) => {
            Api::<DaemonSet>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::StatefulSet(w) => {
            Api::<StatefulSet>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::Job(w) => {
            Api::<Job>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::CronJob(w) => {
            Api::<CronJob>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::Rollout(w) => {
            Api::<Rollout>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
        Workload::DeploymentConfig(w) => {
            Api::<DeploymentConfig>::namespaced(client, &namespace)
                .replace(&name, &pp, w)
                .await?;
        }
    }
    Ok(())
}
