//! # Source Controllers
//!
//! The generic reconcile flow shared by the ConfigMap and Secret
//! controllers. Each controller drives a watch stream; deliveries are
//! classified against the fingerprint store (create / update / delete),
//! filtered by the predicate layer, then dispatched to worker tasks.
//!
//! Dispatch keeps the scheduling contract: a global concurrency cap, a
//! per-key lock so at most one reconciliation per (kind, namespace, name)
//! is in flight, and per-key ordering by lock acquisition. The initial
//! list replay warms the fingerprint store before the controller marks
//! itself initialized, so a restart does not spuriously reload the fleet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use futures::{StreamExt, TryStreamExt};
use kube::api::Api;
use kube::core::NamespaceResourceScope;
use kube_runtime::{watcher, WatchStreamExt};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::controller::{Context, SourceState};
use crate::filter::{DropReason, EventFilter, EventKind, EventMeta};
use crate::matcher::{match_workload, ReloadDecision, SourceRef, SourceType};
use crate::notify::WebhookPayload;
use crate::observability::metrics;
use crate::ratelimit::RateLimiter;

/// Retry schedule for failed reconciliations of one event. The content
/// fingerprint is only recorded on success, so an exhausted event is
/// re-admitted by the next delivery of the same resource.
const RECONCILE_ATTEMPTS: u32 = 3;
const RECONCILE_RETRY_BASE_SECS: u64 = 1;

/// A watched source resource kind (ConfigMap or Secret).
pub trait ReloadSource:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Lowercase resource type label for metrics.
    const RESOURCE_TYPE: &'static str;

    fn source_type() -> SourceType;

    /// Fingerprint of the live object's user-visible data.
    fn content_hash(&self) -> String;

    /// Fingerprint a deleted resource reloads with (hash of empty content).
    fn empty_content_hash() -> String;

    /// This controller's single-shot init flag and fingerprint store.
    fn state(ctx: &Context) -> &Arc<SourceState>;
}

type KeyLocks = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Run the controller for one source kind until its watch stream ends.
pub async fn run_source_controller<S: ReloadSource>(ctx: Arc<Context>) -> Result<()> {
    let api: Api<S> = match &ctx.config.watched_namespace {
        Some(namespace) => Api::namespaced(ctx.client.clone(), namespace),
        None => Api::all(ctx.client.clone()),
    };
    let mut watch_config = watcher::Config::default();
    if !ctx.config.resource_selector.is_empty() {
        // Server-side filtering; the predicate layer re-checks client-side
        watch_config = watch_config.labels(ctx.config.resource_selector.as_query());
    }

    let semaphore = Arc::new(Semaphore::new(usize::from(ctx.config.concurrency)));
    let limiter = ctx
        .config
        .reconcile_qps
        .map(|qps| Arc::new(RateLimiter::new(qps, ctx.config.concurrency)));
    let key_locks: KeyLocks = Arc::default();
    let mut stream = watcher(api, watch_config).default_backoff().boxed();

    info!("{} controller watching", S::source_type().as_str());

    loop {
        match stream.try_next().await {
            Ok(Some(event)) => match event {
                watcher::Event::Init => {}
                watcher::Event::InitApply(obj) => {
                    // Startup replay runs inline so the store is warm
                    // before InitDone flips the initialized flag
                    process_event::<S>(&ctx, obj, false).await;
                }
                watcher::Event::InitDone => {
                    if S::state(&ctx).mark_initialized() {
                        info!(
                            "{} controller cache synced and initialized",
                            S::source_type().as_str()
                        );
                    }
                }
                watcher::Event::Apply(obj) => {
                    dispatch::<S>(&ctx, &semaphore, &limiter, &key_locks, obj, false);
                }
                watcher::Event::Delete(obj) => {
                    dispatch::<S>(&ctx, &semaphore, &limiter, &key_locks, obj, true);
                }
            },
            Ok(None) => {
                info!("{} controller stream ended", S::source_type().as_str());
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "{} watch error (stream will restart): {}",
                    S::source_type().as_str(),
                    e
                );
                metrics::increment_errors("watch");
            }
        }
    }
}

/// Hand one admitted-or-not delivery to a worker task.
fn dispatch<S: ReloadSource>(
    ctx: &Arc<Context>,
    semaphore: &Arc<Semaphore>,
    limiter: &Option<Arc<RateLimiter>>,
    key_locks: &KeyLocks,
    obj: S,
    deleted: bool,
) {
    let ctx = ctx.clone();
    let semaphore = semaphore.clone();
    let limiter = limiter.clone();
    let key = resource_key(&obj);
    let lock = {
        let mut locks = key_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    };

    metrics::workqueue_item_start();
    let queued_at = Instant::now();
    tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire().await else {
            // Semaphore closed: shutting down
            metrics::workqueue_item_done(S::RESOURCE_TYPE, queued_at.elapsed().as_secs_f64());
            return;
        };
        if let Some(limiter) = &limiter {
            limiter.acquire().await;
        }
        let _key_guard = lock.lock().await;
        process_event::<S>(&ctx, obj, deleted).await;
        metrics::workqueue_item_done(S::RESOURCE_TYPE, queued_at.elapsed().as_secs_f64());
    });
}

fn resource_key<S: ReloadSource>(obj: &S) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Classify, filter, and reconcile one watch delivery.
async fn process_event<S: ReloadSource>(ctx: &Context, obj: S, deleted: bool) {
    let state = S::state(ctx);
    let key = resource_key(&obj);
    let meta = obj.meta();
    let namespace = meta.namespace.clone().unwrap_or_default();
    let name = meta.name.clone().unwrap_or_default();

    let old_hash = state.fingerprint(&key);
    let (event_kind, new_hash) = if deleted {
        (EventKind::Delete, None)
    } else if old_hash.is_some() {
        (EventKind::Update, Some(obj.content_hash()))
    } else {
        (EventKind::Create, Some(obj.content_hash()))
    };

    metrics::increment_events_received(event_kind.as_str(), S::RESOURCE_TYPE);

    let empty_labels = std::collections::BTreeMap::new();
    let empty_annotations = std::collections::BTreeMap::new();
    let event_meta = EventMeta {
        namespace: &namespace,
        labels: meta.labels.as_ref().unwrap_or(&empty_labels),
        annotations: meta.annotations.as_ref().unwrap_or(&empty_annotations),
    };

    let verdict = EventFilter::new(&ctx.config).evaluate(
        event_kind,
        event_meta,
        old_hash.as_deref(),
        new_hash.as_deref(),
        state.is_initialized(),
    );
    if let Err(reason) = verdict {
        metrics::increment_skipped(reason.as_str());
        if reason != DropReason::NamespaceIgnored {
            // Dropped events still advance the fingerprint so the next
            // delivery diffs against what was last observed. Ignored
            // namespaces are left untracked entirely.
            remember_outcome(state, &key, event_kind, new_hash.as_deref());
        }
        debug!(
            "Dropped {} event for {} {}: {}",
            event_kind.as_str(),
            S::RESOURCE_TYPE,
            key,
            reason.as_str()
        );
        return;
    }

    // A deleted resource reloads consumers with the hash of empty content
    let effective_hash = match event_kind {
        EventKind::Delete => S::empty_content_hash(),
        _ => new_hash.clone().unwrap_or_default(),
    };
    let source = SourceRef {
        kind: S::source_type(),
        name: name.clone(),
        namespace: namespace.clone(),
        hash: effective_hash,
        match_enabled: meta
            .annotations
            .as_ref()
            .and_then(|a| a.get(&ctx.config.annotations.match_resource))
            .is_some_and(|v| v == "true"),
    };

    let mut retry_delay = RECONCILE_RETRY_BASE_SECS;
    for attempt in 1..=RECONCILE_ATTEMPTS {
        let started = Instant::now();
        match reconcile_admitted(ctx, &source).await {
            Ok(result) => {
                metrics::record_reconcile(result, started.elapsed().as_secs_f64());
                metrics::increment_events_processed(
                    event_kind.as_str(),
                    S::RESOURCE_TYPE,
                    result,
                );
                remember_outcome(state, &key, event_kind, new_hash.as_deref());
                return;
            }
            Err(e) => {
                metrics::record_reconcile("error", started.elapsed().as_secs_f64());
                metrics::increment_errors("reconcile");
                if attempt == RECONCILE_ATTEMPTS {
                    metrics::increment_events_processed(
                        event_kind.as_str(),
                        S::RESOURCE_TYPE,
                        "error",
                    );
                    error!(
                        "Reconcile of {} {} failed after {} attempts: {:#}",
                        S::RESOURCE_TYPE, key, RECONCILE_ATTEMPTS, e
                    );
                    // Fingerprint untouched: the next delivery re-admits
                    return;
                }
                warn!(
                    "Reconcile of {} {} failed (attempt {}): {:#}; retrying in {}s",
                    S::RESOURCE_TYPE, key, attempt, e, retry_delay
                );
                tokio::time::sleep(std::time::Duration::from_secs(retry_delay)).await;
                retry_delay *= 2;
            }
        }
    }
}

fn remember_outcome(state: &SourceState, key: &str, kind: EventKind, new_hash: Option<&str>) {
    match kind {
        EventKind::Delete => state.forget_fingerprint(key),
        _ => {
            if let Some(hash) = new_hash {
                state.record_fingerprint(key, hash);
            }
        }
    }
}

/// The admitted-event flow: consult the namespace cache, list workloads,
/// collect decisions, then either notify the webhook or drive reloads.
async fn reconcile_admitted(ctx: &Context, source: &SourceRef) -> Result<&'static str> {
    if !ctx.namespaces.contains(&source.namespace) {
        metrics::increment_skipped("namespace-selector-mismatch");
        return Ok("skipped");
    }

    let workloads = ctx.registry.list_namespace(&source.namespace).await?;
    let mut decisions: Vec<ReloadDecision> = Vec::new();
    for workload in &workloads {
        metrics::increment_workloads_scanned(workload.kind().as_str());
        if let Some(decision) = match_workload(source, workload, &ctx.config) {
            debug!(
                "{} {}/{} matched ({})",
                decision.workload.kind(),
                decision.workload.namespace(),
                decision.workload.name(),
                decision.reason.as_str()
            );
            metrics::increment_workloads_matched(decision.workload.kind().as_str());
            decisions.push(decision);
        }
    }

    if decisions.is_empty() {
        return Ok("no-match");
    }

    // Webhook mode short-circuits mutation entirely
    if let Some(webhook) = &ctx.webhook {
        let payload = WebhookPayload::new(source, &decisions);
        return match webhook.send(&payload).await {
            Ok(()) => {
                info!(
                    "Notified webhook for {} ({} workload(s))",
                    source.provenance(),
                    decisions.len()
                );
                metrics::record_reload_executed(
                    true,
                    &source.namespace,
                    ctx.config.metrics_by_namespace,
                );
                Ok("webhook-sent")
            }
            Err(e) => {
                metrics::record_reload_executed(
                    false,
                    &source.namespace,
                    ctx.config.metrics_by_namespace,
                );
                metrics::increment_errors("webhook");
                Err(e)
            }
        };
    }

    let mut updated = 0usize;
    let mut first_error = None;
    for decision in &decisions {
        match ctx.executor.apply_decision(source, decision).await {
            Ok(true) => {
                updated += 1;
                info!(
                    "Reloaded {} {}/{} for {} ({})",
                    decision.workload.kind(),
                    decision.workload.namespace(),
                    decision.workload.name(),
                    source.provenance(),
                    decision.reason.as_str()
                );
                metrics::record_reload_executed(
                    true,
                    &source.namespace,
                    ctx.config.metrics_by_namespace,
                );
                ctx.publish_reload_event(&decision.workload, source, true, None)
                    .await;
                if let Some(alerts) = &ctx.alerts {
                    alerts.notify_reloaded(source, &decision.workload).await;
                }
            }
            Ok(false) => {
                debug!(
                    "{} {}/{} already encodes {}; no write",
                    decision.workload.kind(),
                    decision.workload.namespace(),
                    decision.workload.name(),
                    source.hash
                );
            }
            Err(e) => {
                metrics::record_reload_executed(
                    false,
                    &source.namespace,
                    ctx.config.metrics_by_namespace,
                );
                metrics::increment_errors("reload");
                ctx.publish_reload_event(
                    &decision.workload,
                    source,
                    false,
                    Some(&format!("{e:#}")),
                )
                .await;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None if updated > 0 => Ok("reloaded"),
        None => Ok("unchanged"),
    }
}
