//! # Retry / Execution Driver
//!
//! Applies a reload decision to the cluster. Execution is dispatched by
//! workload kind:
//!
//! - direct-mutation kinds run an optimistic-concurrency retry loop
//!   (re-fetch on conflict, bounded attempts, exponential backoff with
//!   jitter), consulting the pause scheduler before each write;
//! - Jobs are deleted and recreated with server-populated identity
//!   stripped;
//! - CronJobs are never updated; a fresh Job is instantiated from their
//!   job template instead.
//!
//! The driver's boolean result means "something observably changed";
//! `false` is the idempotent no-op outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{
    CRONJOB_INSTANTIATE_ANNOTATION, FIELD_MANAGER, UPDATE_RETRY_ATTEMPTS, UPDATE_RETRY_BASE_MS,
    UPDATE_RETRY_MAX_MS,
};
use crate::matcher::{ReloadDecision, SourceRef};
use crate::observability::metrics;
use crate::pause;
use crate::strategy;
use crate::workload::registry::{get_workload, replace_workload};
use crate::workload::{ExecutionStrategy, Workload};

/// Bounded exponential backoff with jitter for conflict retries.
#[derive(Debug)]
struct RetryBackoff {
    next_ms: u64,
    max_ms: u64,
}

impl RetryBackoff {
    fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            next_ms: base_ms.max(1),
            max_ms,
        }
    }

    fn delay(&mut self) -> Duration {
        let base = self.next_ms;
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        self.next_ms = (self.next_ms * 2).min(self.max_ms);
        Duration::from_millis((base + jitter).min(self.max_ms))
    }
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 409)
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 404)
}

/// Executes reload decisions against the cluster.
#[derive(Clone)]
pub struct ReloadExecutor {
    client: Client,
    config: Arc<Config>,
}

impl std::fmt::Debug for ReloadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadExecutor").finish_non_exhaustive()
    }
}

impl ReloadExecutor {
    #[must_use]
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Apply one decision. Returns whether the cluster observably changed.
    pub async fn apply_decision(
        &self,
        source: &SourceRef,
        decision: &ReloadDecision,
    ) -> Result<bool> {
        let kind = decision.workload.kind();
        let start = Instant::now();
        let outcome = match decision.workload.execution_strategy() {
            ExecutionStrategy::InPlaceUpdate => self.update_in_place(source, decision).await,
            ExecutionStrategy::Recreate => self.recreate_job(source, decision).await,
            ExecutionStrategy::InstantiateFromTemplate => {
                self.instantiate_from_cronjob(source, decision).await
            }
        };

        let result_label = match &outcome {
            Ok(true) => "updated",
            Ok(false) => "unchanged",
            Err(_) => "error",
        };
        metrics::record_action(kind.as_str(), result_label, start.elapsed().as_secs_f64());
        outcome
    }

    /// Optimistic-concurrency update loop for direct-mutation kinds.
    async fn update_in_place(&self, source: &SourceRef, decision: &ReloadDecision) -> Result<bool> {
        let keys = &self.config.annotations;
        let strategy_choice = strategy::select_strategy(
            &decision.workload,
            self.config.reload_strategy,
            keys,
        );

        let mut backoff = RetryBackoff::new(UPDATE_RETRY_BASE_MS, UPDATE_RETRY_MAX_MS);
        let mut live = decision.workload.clone();
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                // Re-fetch after a conflict; a vanished object is a no-op
                match get_workload(
                    &self.client,
                    decision.workload.kind(),
                    decision.workload.namespace(),
                    decision.workload.name(),
                )
                .await
                .context("re-fetch after conflict failed")?
                {
                    Some(fresh) => live = fresh,
                    None => {
                        debug!(
                            "{} {}/{} disappeared during retry; nothing to do",
                            decision.workload.kind(),
                            decision.workload.namespace(),
                            decision.workload.name()
                        );
                        return Ok(false);
                    }
                }
            }

            let mut candidate = live.clone();
            let changed = strategy::apply(&mut candidate, source, strategy_choice, keys);
            if !changed {
                return Ok(false);
            }
            pause::attach_pause(&mut candidate, keys, self.config.default_pause_period);

            match replace_workload(&self.client, &candidate).await {
                Ok(()) => return Ok(true),
                Err(e) if is_conflict(&e) && attempt + 1 < UPDATE_RETRY_ATTEMPTS => {
                    metrics::increment_retries();
                    let delay = backoff.delay();
                    debug!(
                        "Conflict updating {} {}/{} (attempt {}); retrying in {:?}",
                        candidate.kind(),
                        candidate.namespace(),
                        candidate.name(),
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if is_not_found(&e) => {
                    debug!(
                        "{} {}/{} deleted before write; nothing to do",
                        candidate.kind(),
                        candidate.namespace(),
                        candidate.name()
                    );
                    return Ok(false);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "failed to update {} {}/{}",
                            candidate.kind(),
                            candidate.namespace(),
                            candidate.name()
                        )
                    });
                }
            }
        }
    }

    /// Lift a controller-applied pause from a workload, with the same
    /// conflict-retry discipline as reload updates. Exits no-op when the
    /// workload is gone or no longer paused by the controller.
    pub async fn unpause(
        &self,
        kind: crate::workload::WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let keys = &self.config.annotations;
        let mut backoff = RetryBackoff::new(UPDATE_RETRY_BASE_MS, UPDATE_RETRY_MAX_MS);
        let mut attempt = 0;
        loop {
            let Some(mut workload) = get_workload(&self.client, kind, namespace, name)
                .await
                .context("fetch for unpause failed")?
            else {
                return Ok(false);
            };
            if !pause::clear_pause(&mut workload, keys) {
                return Ok(false);
            }

            match replace_workload(&self.client, &workload).await {
                Ok(()) => {
                    info!("Unpaused {} {}/{} after pause period expiry", kind, namespace, name);
                    return Ok(true);
                }
                Err(e) if is_conflict(&e) && attempt + 1 < UPDATE_RETRY_ATTEMPTS => {
                    metrics::increment_retries();
                    tokio::time::sleep(backoff.delay()).await;
                    attempt += 1;
                }
                Err(e) if is_not_found(&e) => return Ok(false),
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to unpause {kind} {namespace}/{name}")
                    });
                }
            }
        }
    }

    /// Jobs are immutable where it matters, so reload means recreate.
    async fn recreate_job(&self, source: &SourceRef, decision: &ReloadDecision) -> Result<bool> {
        let keys = &self.config.annotations;
        let strategy_choice = strategy::select_strategy(
            &decision.workload,
            self.config.reload_strategy,
            keys,
        );

        let mut candidate = decision.workload.clone();
        if !strategy::apply(&mut candidate, source, strategy_choice, keys) {
            return Ok(false);
        }
        let Workload::Job(mut job) = candidate else {
            return Ok(false);
        };

        let namespace = decision.workload.namespace().to_string();
        let name = decision.workload.name().to_string();
        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);

        match api.delete(&name, &DeleteParams::background()).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to delete Job {namespace}/{name}"));
            }
        }

        sanitize_recreated_job(&mut job);

        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        api.create(&pp, &job)
            .await
            .with_context(|| format!("failed to recreate Job {namespace}/{name}"))?;
        info!("Recreated Job {}/{} for {}", namespace, name, source.provenance());
        Ok(true)
    }

    /// CronJobs are left untouched; the reload materializes as a manual
    /// Job instantiated from the (fingerprint-carrying) job template.
    async fn instantiate_from_cronjob(
        &self,
        source: &SourceRef,
        decision: &ReloadDecision,
    ) -> Result<bool> {
        let keys = &self.config.annotations;
        let strategy_choice = strategy::select_strategy(
            &decision.workload,
            self.config.reload_strategy,
            keys,
        );

        let mut candidate = decision.workload.clone();
        if !strategy::apply(&mut candidate, source, strategy_choice, keys) {
            return Ok(false);
        }
        let Workload::CronJob(cron) = candidate else {
            return Ok(false);
        };

        let namespace = decision.workload.namespace().to_string();
        let name = decision.workload.name().to_string();
        let Some(job) = job_from_cronjob(&cron) else {
            warn!(
                "CronJob {}/{} has no job template spec; skipping",
                namespace, name
            );
            return Ok(false);
        };

        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        api.create(&pp, &job).await.with_context(|| {
            format!("failed to instantiate Job from CronJob {namespace}/{name}")
        })?;
        info!(
            "Instantiated Job from CronJob {}/{} for {}",
            namespace,
            name,
            source.provenance()
        );
        Ok(true)
    }
}

/// Auto-populated Job labels the API server refuses on creation.
const JOB_IDENTITY_LABELS: [&str; 4] = [
    "controller-uid",
    "job-name",
    "batch.kubernetes.io/controller-uid",
    "batch.kubernetes.io/job-name",
];

/// Strip server-populated identity so a deleted Job can be re-created.
fn sanitize_recreated_job(job: &mut Job) {
    job.metadata.resource_version = None;
    job.metadata.uid = None;
    job.metadata.creation_timestamp = None;
    job.metadata.generation = None;
    job.metadata.managed_fields = None;
    job.metadata.owner_references = None;
    job.status = None;

    strip_identity_labels(&mut job.metadata);
    if let Some(spec) = job.spec.as_mut() {
        spec.selector = None;
        if let Some(template_meta) = spec.template.metadata.as_mut() {
            strip_identity_labels(template_meta);
        }
    }
}

fn strip_identity_labels(meta: &mut ObjectMeta) {
    if let Some(labels) = meta.labels.as_mut() {
        for key in JOB_IDENTITY_LABELS {
            labels.remove(key);
        }
        if labels.is_empty() {
            meta.labels = None;
        }
    }
}

/// Build the manual Job a CronJob reload creates, mirroring
/// `kubectl create job --from=cronjob/<name>`.
fn job_from_cronjob(cron: &CronJob) -> Option<Job> {
    let cron_name = cron.metadata.name.as_deref()?;
    let job_template = &cron.spec.as_ref()?.job_template;
    let job_spec = job_template.spec.clone()?;

    let template_meta = job_template.metadata.clone().unwrap_or_default();
    let mut annotations = template_meta.annotations.unwrap_or_default();
    annotations.insert(
        CRONJOB_INSTANTIATE_ANNOTATION.to_string(),
        "manual".to_string(),
    );

    let owner = OwnerReference {
        api_version: "batch/v1".to_string(),
        kind: "CronJob".to_string(),
        name: cron_name.to_string(),
        uid: cron.metadata.uid.clone().unwrap_or_default(),
        controller: None,
        block_owner_deletion: None,
    };

    Some(Job {
        metadata: ObjectMeta {
            generate_name: Some(format!("{cron_name}-")),
            namespace: cron.metadata.namespace.clone(),
            labels: template_meta.labels,
            annotations: Some(annotations),
            owner_references: Some(vec![owner]),
            ..ObjectMeta::default()
        },
        spec: Some(job_spec),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{CronJobSpec, JobSpec, JobTemplateSpec};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
    use kube::core::ErrorResponse;
    use std::collections::BTreeMap;

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = RetryBackoff::new(100, 400);
        let first = backoff.delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let second = backoff.delay();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(300));
        let third = backoff.delay();
        assert!(third <= Duration::from_millis(400));
        let fourth = backoff.delay();
        assert!(fourth <= Duration::from_millis(400), "stays capped");
    }

    #[test]
    fn test_conflict_classification() {
        let conflict = kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "conflict".into(),
            reason: "Conflict".into(),
            code: 409,
        });
        let missing = kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "not found".into(),
            reason: "NotFound".into(),
            code: 404,
        });
        assert!(is_conflict(&conflict));
        assert!(!is_conflict(&missing));
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&conflict));
    }

    fn job_with_identity() -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some("job-e".into()),
                namespace: Some("ns-x".into()),
                resource_version: Some("42".into()),
                uid: Some("uid-1".into()),
                creation_timestamp: Some(Time(chrono::Utc::now())),
                labels: Some(BTreeMap::from([
                    ("controller-uid".to_string(), "uid-1".to_string()),
                    ("batch.kubernetes.io/job-name".to_string(), "job-e".to_string()),
                    ("app".to_string(), "batch".to_string()),
                ])),
                ..ObjectMeta::default()
            },
            spec: Some(JobSpec {
                selector: Some(LabelSelector::default()),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([
                            ("job-name".to_string(), "job-e".to_string()),
                            ("app".to_string(), "batch".to_string()),
                        ])),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "batch".into(),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                },
                ..JobSpec::default()
            }),
            status: Some(Default::default()),
        }
    }

    #[test]
    fn test_sanitize_recreated_job_strips_identity() {
        let mut job = job_with_identity();
        sanitize_recreated_job(&mut job);

        assert!(job.metadata.resource_version.is_none());
        assert!(job.metadata.uid.is_none());
        assert!(job.metadata.creation_timestamp.is_none());
        assert!(job.status.is_none());

        let labels = job.metadata.labels.as_ref().unwrap();
        assert!(!labels.contains_key("controller-uid"));
        assert!(!labels.contains_key("batch.kubernetes.io/job-name"));
        assert_eq!(labels.get("app").map(String::as_str), Some("batch"));

        let spec = job.spec.as_ref().unwrap();
        assert!(spec.selector.is_none());
        let template_labels = spec
            .template
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .as_ref()
            .unwrap();
        assert!(!template_labels.contains_key("job-name"));
    }

    #[test]
    fn test_job_from_cronjob_shape() {
        let cron = CronJob {
            metadata: ObjectMeta {
                name: Some("nightly".into()),
                namespace: Some("ns-x".into()),
                uid: Some("cron-uid".into()),
                ..ObjectMeta::default()
            },
            spec: Some(CronJobSpec {
                job_template: JobTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([(
                            "app".to_string(),
                            "nightly".to_string(),
                        )])),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(JobSpec {
                        template: PodTemplateSpec::default(),
                        ..JobSpec::default()
                    }),
                },
                ..CronJobSpec::default()
            }),
            ..CronJob::default()
        };

        let job = job_from_cronjob(&cron).unwrap();
        assert_eq!(job.metadata.generate_name.as_deref(), Some("nightly-"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("ns-x"));
        assert_eq!(
            job.metadata
                .annotations
                .as_ref()
                .unwrap()
                .get(CRONJOB_INSTANTIATE_ANNOTATION)
                .map(String::as_str),
            Some("manual")
        );
        let owner = &job.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "CronJob");
        assert_eq!(owner.name, "nightly");
        assert_eq!(owner.uid, "cron-uid");
        assert!(job.spec.is_some());
    }

    #[test]
    fn test_job_from_cronjob_requires_template_spec() {
        let cron = CronJob {
            metadata: ObjectMeta {
                name: Some("nightly".into()),
                ..ObjectMeta::default()
            },
            spec: Some(CronJobSpec::default()),
            ..CronJob::default()
        };
        assert!(job_from_cronjob(&cron).is_none());
    }
}
