//! # Pause Scheduler
//!
//! A lightweight reconciler per pause-capable kind (Deployment, and
//! Rollout / DeploymentConfig when enabled), predicated on presence of
//! the `paused-at` stamp. A paused workload is requeued for exactly the
//! remaining pause time; once expired it is unpaused through the retry
//! driver. Operator-initiated pauses (no stamp) are never touched.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::Api;
use kube::core::NamespaceResourceScope;
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS;
use crate::controller::{Context, ReconcilerError};
use crate::observability::metrics;
use crate::pause;
use crate::workload::{DeploymentConfig, Rollout, Workload, WorkloadKind};

/// Run one pause controller per enabled pause-capable kind until shutdown.
pub async fn run_pause_controllers(ctx: Arc<Context>) -> Result<()> {
    let kinds = ctx.config.enabled_workload_kinds();
    let mut controllers = Vec::new();
    if kinds.contains(&WorkloadKind::Deployment) {
        controllers.push(tokio::spawn(run_for::<Deployment>(ctx.clone())));
    }
    if kinds.contains(&WorkloadKind::Rollout) {
        controllers.push(tokio::spawn(run_for::<Rollout>(ctx.clone())));
    }
    if kinds.contains(&WorkloadKind::DeploymentConfig) {
        controllers.push(tokio::spawn(run_for::<DeploymentConfig>(ctx.clone())));
    }

    for handle in controllers {
        handle.await?;
    }
    Ok(())
}

async fn run_for<K>(ctx: Arc<Context>)
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    Workload: From<K>,
{
    let api: Api<K> = match &ctx.config.watched_namespace {
        Some(namespace) => Api::namespaced(ctx.client.clone(), namespace),
        None => Api::all(ctx.client.clone()),
    };

    info!("Pause scheduler watching {}", K::kind(&()));

    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(ctx.config.concurrency))
        .run(reconcile_pause::<K>, pause_error_policy::<K>, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!("Pause scheduler dispatch error: {:?}", e);
            }
        })
        .await;
}

async fn reconcile_pause<K>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action, ReconcilerError>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    Workload: From<K>,
{
    let workload = Workload::from((*obj).clone());
    let keys = &ctx.config.annotations;

    if !pause::is_paused_by_reloader(&workload, keys) {
        return Ok(Action::await_change());
    }

    match pause::remaining_pause(
        &workload,
        keys,
        ctx.config.default_pause_period,
        Utc::now(),
    ) {
        Some(remaining) => {
            debug!(
                "{} {}/{} paused for another {:?}",
                workload.kind(),
                workload.namespace(),
                workload.name(),
                remaining
            );
            Ok(Action::requeue(remaining))
        }
        None => {
            ctx.executor
                .unpause(workload.kind(), workload.namespace(), workload.name())
                .await
                .map_err(ReconcilerError::ReconciliationFailed)?;
            Ok(Action::await_change())
        }
    }
}

fn pause_error_policy<K>(obj: Arc<K>, error: &ReconcilerError, _ctx: Arc<Context>) -> Action
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    error!(
        "Pause reconcile error for {}/{}: {:?}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default(),
        error
    );
    metrics::increment_errors("pause");
    Action::requeue(Duration::from_secs(DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS))
}
