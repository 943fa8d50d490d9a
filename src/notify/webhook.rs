//! # Webhook Notifier
//!
//! When a webhook endpoint is configured the controller does not mutate
//! workloads; it sends a single JSON notification per reconcile carrying
//! the changed resource, its fingerprint, and every workload that would
//! have been reloaded. The receiving system owns the rollout from there.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::constants::OUTBOUND_SEND_TIMEOUT_SECS;
use crate::matcher::{ReloadDecision, SourceRef};

/// A workload referenced in a webhook payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// The notification body sent to the configured webhook endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Kind of the changed resource (`ConfigMap` or `Secret`)
    pub kind: String,
    pub namespace: String,
    pub resource_name: String,
    /// Lowercase resource type for consumers keying on it
    pub resource_type: String,
    pub hash: String,
    /// ISO8601 UTC timestamp of the notification
    pub timestamp: String,
    pub workloads: Vec<WorkloadRef>,
}

impl WebhookPayload {
    /// Build the payload for a changed resource and its reload decisions.
    #[must_use]
    pub fn new(source: &SourceRef, decisions: &[ReloadDecision]) -> Self {
        Self {
            kind: source.kind.as_str().to_string(),
            namespace: source.namespace.clone(),
            resource_name: source.name.clone(),
            resource_type: source.kind.as_str().to_lowercase(),
            hash: source.hash.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            workloads: decisions
                .iter()
                .map(|d| WorkloadRef {
                    kind: d.workload.kind().as_str().to_string(),
                    name: d.workload.name().to_string(),
                    namespace: d.workload.namespace().to_string(),
                })
                .collect(),
        }
    }
}

/// Posts payloads to the configured endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_SEND_TIMEOUT_SECS))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Deliver one notification. Non-2xx responses are errors so the
    /// reconcile can surface the failure and let the queue back off.
    pub async fn send(&self, payload: &WebhookPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("webhook send to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "webhook endpoint {} returned status {}",
                self.url,
                status
            ));
        }
        Ok(())
    }
}
