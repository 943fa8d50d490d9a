//! # Alert Sink
//!
//! Best-effort notification of successful reloads to a chat-style
//! webhook (Slack-compatible `{"text": ...}` body). Delivery failures
//! are logged and never fail the reconcile that triggered them.

use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::constants::OUTBOUND_SEND_TIMEOUT_SECS;
use crate::matcher::SourceRef;
use crate::workload::Workload;

#[derive(Debug, Clone)]
pub struct AlertSink {
    client: reqwest::Client,
    url: String,
}

impl AlertSink {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_SEND_TIMEOUT_SECS))
            .build()
            .context("failed to build alert HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Announce a successful reload. Errors are swallowed after logging.
    pub async fn notify_reloaded(&self, source: &SourceRef, workload: &Workload) {
        let text = format!(
            "Reloaded {} {}/{} after {} changed (hash {})",
            workload.kind(),
            workload.namespace(),
            workload.name(),
            source.provenance(),
            source.hash,
        );
        let body = json!({ "text": text });

        let result = self.client.post(&self.url).json(&body).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    "Alert sink {} returned status {}",
                    self.url,
                    response.status()
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Alert send to {} failed: {}", self.url, e);
            }
        }
    }
}
