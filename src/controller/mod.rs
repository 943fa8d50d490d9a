//! # Controllers
//!
//! The per-resource-kind reconcilers and their shared context: ConfigMap
//! and Secret source controllers, the namespace selector cache, and the
//! pause scheduler.

pub mod configmap;
pub mod namespace;
pub mod pause;
pub mod secret;
pub mod source;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::executor::ReloadExecutor;
use crate::matcher::SourceRef;
use crate::notify::{AlertSink, WebhookNotifier};
use crate::workload::registry::WorkloadRegistry;
use crate::workload::Workload;

pub use namespace::NamespaceCache;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Per-source-controller state: the single-shot `initialized` flag and
/// the fingerprint store backing the content-change predicate.
#[derive(Debug, Default)]
pub struct SourceState {
    initialized: AtomicBool,
    fingerprints: Mutex<HashMap<String, String>>,
}

impl SourceState {
    /// Single-shot flip; concurrent callers observe one transition.
    /// Returns true for the caller that performed the flip.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fingerprint(&self, key: &str) -> Option<String> {
        self.fingerprints
            .lock()
            .map(|store| store.get(key).cloned())
            .unwrap_or_else(|poisoned| poisoned.into_inner().get(key).cloned())
    }

    pub fn record_fingerprint(&self, key: &str, hash: &str) {
        let mut store = self
            .fingerprints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        store.insert(key.to_string(), hash.to_string());
    }

    pub fn forget_fingerprint(&self, key: &str) {
        let mut store = self
            .fingerprints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        store.remove(key);
    }
}

/// Shared context handed to every reconciler.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<Config>,
    pub registry: WorkloadRegistry,
    pub executor: ReloadExecutor,
    pub namespaces: NamespaceCache,
    pub recorder: Recorder,
    pub webhook: Option<WebhookNotifier>,
    pub alerts: Option<AlertSink>,
    pub configmap_state: Arc<SourceState>,
    pub secret_state: Arc<SourceState>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("webhook", &self.webhook.is_some())
            .field("alerts", &self.alerts.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    #[must_use]
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        let reporter = Reporter {
            controller: crate::constants::FIELD_MANAGER.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        let webhook = config
            .webhook_url
            .as_deref()
            .and_then(|url| match WebhookNotifier::new(url) {
                Ok(notifier) => Some(notifier),
                Err(e) => {
                    warn!("Disabling webhook mode: {}", e);
                    None
                }
            });
        let alerts = config
            .alert_webhook_url
            .as_deref()
            .and_then(|url| match AlertSink::new(url) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    warn!("Disabling alert sink: {}", e);
                    None
                }
            });
        Self {
            registry: WorkloadRegistry::new(client.clone(), config.clone()),
            executor: ReloadExecutor::new(client.clone(), config.clone()),
            namespaces: NamespaceCache::new(config.namespace_selectors_enabled()),
            recorder,
            webhook,
            alerts,
            configmap_state: Arc::new(SourceState::default()),
            secret_state: Arc::new(SourceState::default()),
            client,
            config,
        }
    }

    /// Publish a `Reloaded`/`ReloadFailed` cluster event on a workload.
    /// Event delivery is best-effort; failures are logged only.
    pub async fn publish_reload_event(
        &self,
        workload: &Workload,
        source: &SourceRef,
        success: bool,
        detail: Option<&str>,
    ) {
        let (type_, reason, note) = if success {
            (
                EventType::Normal,
                "Reloaded".to_string(),
                format!(
                    "Rolled {} {}/{} because {} changed",
                    workload.kind(),
                    workload.namespace(),
                    workload.name(),
                    source.provenance()
                ),
            )
        } else {
            (
                EventType::Warning,
                "ReloadFailed".to_string(),
                format!(
                    "Failed to roll {} {}/{} for {}: {}",
                    workload.kind(),
                    workload.namespace(),
                    workload.name(),
                    source.provenance(),
                    detail.unwrap_or("unknown error")
                ),
            )
        };

        let event = Event {
            type_,
            reason,
            note: Some(note),
            action: "Reload".to_string(),
            secondary: None,
        };
        if let Err(e) = self
            .recorder
            .publish(&event, &workload_object_ref(workload))
            .await
        {
            warn!(
                "Failed to publish event for {} {}/{}: {}",
                workload.kind(),
                workload.namespace(),
                workload.name(),
                e
            );
        }
    }
}

/// Object reference for event attachment.
#[must_use]
pub fn workload_object_ref(workload: &Workload) -> ObjectReference {
    ObjectReference {
        api_version: Some(workload.kind().api_version().to_string()),
        kind: Some(workload.kind().as_str().to_string()),
        name: Some(workload.name().to_string()),
        namespace: Some(workload.namespace().to_string()),
        uid: workload.metadata().uid.clone(),
        ..ObjectReference::default()
    }
}
