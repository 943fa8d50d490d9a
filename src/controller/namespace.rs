//! # Namespace Selector Cache
//!
//! A thread-safe set of namespace names currently matching the configured
//! namespace label selectors, maintained by a lightweight Namespace
//! watcher. Reconcilers consult it to short-circuit; when no selectors
//! are configured the cache admits everything.
//!
//! The cache is an eventually-consistent reflection of namespace labels:
//! after a label edit there is a short window where it disagrees with the
//! cluster. Dropped events are re-delivered on the next resync, so false
//! negatives heal on their own.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube_runtime::{watcher, WatchStreamExt};
use tracing::{debug, info, warn};

use crate::controller::Context;
use crate::observability::metrics;
use crate::selector::Selector;

/// Readers (reconcilers) heavily outnumber the single writer, hence the
/// reader/writer lock.
#[derive(Debug, Clone)]
pub struct NamespaceCache {
    enabled: bool,
    inner: Arc<RwLock<HashSet<String>>>,
}

impl NamespaceCache {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Whether a namespace currently matches; `true` for every input when
    /// selectors are disabled.
    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.inner
            .read()
            .map(|set| set.contains(namespace))
            .unwrap_or_else(|poisoned| poisoned.into_inner().contains(namespace))
    }

    fn insert(&self, namespace: &str) {
        let mut set = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        set.insert(namespace.to_string());
    }

    fn remove(&self, namespace: &str) {
        let mut set = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        set.remove(namespace);
    }

    fn replace(&self, namespaces: HashSet<String>) {
        let mut set = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *set = namespaces;
    }
}

fn namespace_matches(selectors: &[Selector], labels: &BTreeMap<String, String>) -> bool {
    selectors.iter().any(|s| s.matches(labels))
}

/// Drive the cache from a Namespace watch. Runs until the stream ends
/// (shutdown) and restarts the watch internally on transient errors.
pub async fn run_namespace_watcher(ctx: Arc<Context>) -> anyhow::Result<()> {
    let api: Api<Namespace> = Api::all(ctx.client.clone());
    let selectors = &ctx.config.namespace_selectors;
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    info!(
        "Namespace selector cache running with {} selector(s)",
        selectors.len()
    );

    // Relist snapshot under construction between Init and InitDone
    let mut pending: Option<HashSet<String>> = None;

    loop {
        match stream.try_next().await {
            Ok(Some(event)) => match event {
                watcher::Event::Init => {
                    pending = Some(HashSet::new());
                }
                watcher::Event::InitApply(ns) | watcher::Event::Apply(ns) => {
                    let name = ns.metadata.name.clone().unwrap_or_default();
                    let empty = BTreeMap::new();
                    let labels = ns.metadata.labels.as_ref().unwrap_or(&empty);
                    let matched = namespace_matches(selectors, labels);
                    if let Some(snapshot) = pending.as_mut() {
                        if matched {
                            snapshot.insert(name);
                        }
                    } else if matched {
                        debug!("Namespace {} admitted by selector", name);
                        ctx.namespaces.insert(&name);
                    } else {
                        ctx.namespaces.remove(&name);
                    }
                }
                watcher::Event::InitDone => {
                    if let Some(snapshot) = pending.take() {
                        info!("Namespace cache synced ({} namespaces)", snapshot.len());
                        ctx.namespaces.replace(snapshot);
                    }
                }
                watcher::Event::Delete(ns) => {
                    let name = ns.metadata.name.clone().unwrap_or_default();
                    ctx.namespaces.remove(&name);
                }
            },
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Namespace watch error (stream will restart): {}", e);
                metrics::increment_errors("namespace-watch");
            }
        }
    }
}
