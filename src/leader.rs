//! # Leader Election
//!
//! Lease-based leader election over `coordination.k8s.io/v1`. When
//! enabled, a replica blocks until it holds the lease, renews it on the
//! configured cadence while reconcilers run, and releases it on clean
//! shutdown so a standby can take over immediately.
//!
//! Timestamps in the lease are only compared against locally captured
//! instants, so the election tolerates clock skew between holders; what
//! matters is observing the renew time change, not its absolute value.

use anyhow::{Context as _, Result};
use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Clone)]
pub struct LeaderElection {
    api: Api<Lease>,
    config: Arc<Config>,
    identity: String,
}

impl std::fmt::Debug for LeaderElection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElection")
            .field("identity", &self.identity)
            .field("lease", &self.config.lease_name)
            .finish_non_exhaustive()
    }
}

/// Whether a lease record is free for the taking at `now`.
fn lease_available(lease: &Lease, identity: &str, now: chrono::DateTime<Utc>) -> bool {
    let Some(spec) = &lease.spec else {
        return true;
    };
    match spec.holder_identity.as_deref() {
        None | Some("") => true,
        Some(holder) if holder == identity => true,
        Some(_) => {
            let last = spec
                .renew_time
                .as_ref()
                .or(spec.acquire_time.as_ref())
                .map(|t| t.0);
            let duration = i64::from(spec.lease_duration_seconds.unwrap_or(0));
            match last {
                // A holder that never stamped a time holds nothing
                None => true,
                Some(last) => last + chrono::Duration::seconds(duration) < now,
            }
        }
    }
}

impl LeaderElection {
    #[must_use]
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| {
                format!("reload-controller-{:08x}", rand::thread_rng().gen::<u32>())
            });
        let api = Api::namespaced(client, &config.lease_namespace);
        Self {
            api,
            config,
            identity,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn lease_body(&self, transitions: Option<i32>, acquiring: bool) -> Lease {
        let now = MicroTime(Utc::now());
        Lease {
            metadata: ObjectMeta {
                name: Some(self.config.lease_name.clone()),
                namespace: Some(self.config.lease_namespace.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(
                    i32::try_from(self.config.lease_duration.as_secs()).unwrap_or(i32::MAX),
                ),
                acquire_time: acquiring.then(|| now.clone()),
                renew_time: Some(now),
                lease_transitions: transitions,
                ..LeaseSpec::default()
            }),
        }
    }

    /// Block until this replica holds the lease.
    pub async fn acquire(&self) -> Result<()> {
        info!(
            "Waiting for leader lease {}/{} as {}",
            self.config.lease_namespace, self.config.lease_name, self.identity
        );
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!("Acquired leader lease as {}", self.identity);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => warn!("Leader acquisition attempt failed: {:#}", e),
            }
            tokio::time::sleep(self.config.lease_retry).await;
        }
    }

    async fn try_acquire(&self) -> Result<bool> {
        let existing = self
            .api
            .get_opt(&self.config.lease_name)
            .await
            .context("failed to read leader lease")?;

        match existing {
            None => {
                let lease = self.lease_body(Some(1), true);
                match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    // Another replica created it first
                    Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                    Err(e) => Err(e).context("failed to create leader lease"),
                }
            }
            Some(current) => {
                if !lease_available(&current, &self.identity, Utc::now()) {
                    return Ok(false);
                }
                let transitions = current
                    .spec
                    .as_ref()
                    .and_then(|s| s.lease_transitions)
                    .map_or(1, |t| t + 1);
                let mut lease = self.lease_body(Some(transitions), true);
                lease.metadata.resource_version = current.metadata.resource_version.clone();
                match self
                    .api
                    .replace(&self.config.lease_name, &PostParams::default(), &lease)
                    .await
                {
                    Ok(_) => Ok(true),
                    // Lost the race to another replica
                    Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                    Err(e) => Err(e).context("failed to take over leader lease"),
                }
            }
        }
    }

    /// Renew the lease until renewal fails past the deadline. Returning
    /// an error means leadership is lost and the process must stop
    /// reconciling.
    pub async fn hold(&self) -> Result<()> {
        let deadline = self.config.lease_renew;
        loop {
            tokio::time::sleep(deadline).await;
            let renewed = tokio::time::timeout(deadline, self.renew()).await;
            match renewed {
                Ok(Ok(())) => debug!("Renewed leader lease"),
                Ok(Err(e)) => {
                    return Err(e).context("lost leader lease during renewal");
                }
                Err(_) => {
                    return Err(anyhow::anyhow!(
                        "leader lease renewal timed out after {:?}",
                        deadline
                    ));
                }
            }
        }
    }

    async fn renew(&self) -> Result<()> {
        let current = self
            .api
            .get(&self.config.lease_name)
            .await
            .context("failed to read lease for renewal")?;
        let holder = current
            .spec
            .as_ref()
            .and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            return Err(anyhow::anyhow!(
                "lease is now held by {:?}",
                holder.unwrap_or("nobody")
            ));
        }
        let transitions = current.spec.as_ref().and_then(|s| s.lease_transitions);
        let mut lease = self.lease_body(transitions, false);
        // Preserve the original acquire time across renewals
        if let (Some(spec), Some(current_spec)) = (lease.spec.as_mut(), current.spec.as_ref()) {
            spec.acquire_time = current_spec.acquire_time.clone();
        }
        lease.metadata.resource_version = current.metadata.resource_version.clone();
        self.api
            .replace(&self.config.lease_name, &PostParams::default(), &lease)
            .await
            .context("failed to renew leader lease")?;
        Ok(())
    }

    /// Release the lease on clean shutdown so a standby takes over fast.
    pub async fn release(&self) {
        let Ok(Some(current)) = self.api.get_opt(&self.config.lease_name).await else {
            return;
        };
        let holder = current
            .spec
            .as_ref()
            .and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            return;
        }
        let mut released = current.clone();
        if let Some(spec) = released.spec.as_mut() {
            spec.holder_identity = Some(String::new());
            spec.renew_time = None;
        }
        match self
            .api
            .replace(&self.config.lease_name, &PostParams::default(), &released)
            .await
        {
            Ok(_) => info!("Released leader lease"),
            Err(e) => warn!("Failed to release leader lease: {}", e),
        }
    }
}
