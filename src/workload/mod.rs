//! # Workload Abstraction
//!
//! A uniform read/write contract over every workload kind the controller
//! can reload. Each kind exposes the same capability set (annotations,
//! pod template, containers, volumes, in-place mutation) and declares its
//! execution strategy so the retry driver can pick the right write path:
//! in-place update, delete-and-recreate (Job), or instantiate-from-template
//! (CronJob).

pub mod deployment_config;
pub mod registry;
pub mod rollout;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;

pub use deployment_config::DeploymentConfig;
pub use rollout::Rollout;

static EMPTY_ANNOTATIONS: BTreeMap<String, String> = BTreeMap::new();

/// The workload kinds the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
    Rollout,
    DeploymentConfig,
}

/// How the retry driver executes a reload for a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Mutate the live object and update it in place
    InPlaceUpdate,
    /// Delete the existing object and create a sanitized copy (Job)
    Recreate,
    /// Create a fresh Job from the CronJob's job template
    InstantiateFromTemplate,
}

impl WorkloadKind {
    /// Kubernetes kind string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
            WorkloadKind::Rollout => "Rollout",
            WorkloadKind::DeploymentConfig => "DeploymentConfig",
        }
    }

    /// API group/version serving the kind.
    #[must_use]
    pub fn api_version(self) -> &'static str {
        match self {
            WorkloadKind::Deployment | WorkloadKind::DaemonSet | WorkloadKind::StatefulSet => {
                "apps/v1"
            }
            WorkloadKind::Job | WorkloadKind::CronJob => "batch/v1",
            WorkloadKind::Rollout => "argoproj.io/v1alpha1",
            WorkloadKind::DeploymentConfig => "apps.openshift.io/v1",
        }
    }

    #[must_use]
    pub fn execution_strategy(self) -> ExecutionStrategy {
        match self {
            WorkloadKind::Deployment
            | WorkloadKind::DaemonSet
            | WorkloadKind::StatefulSet
            | WorkloadKind::Rollout
            | WorkloadKind::DeploymentConfig => ExecutionStrategy::InPlaceUpdate,
            WorkloadKind::Job => ExecutionStrategy::Recreate,
            WorkloadKind::CronJob => ExecutionStrategy::InstantiateFromTemplate,
        }
    }

    /// Kinds with a native `paused` spec field the pause scheduler can drive.
    #[must_use]
    pub fn supports_pause(self) -> bool {
        matches!(
            self,
            WorkloadKind::Deployment | WorkloadKind::Rollout | WorkloadKind::DeploymentConfig
        )
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown workload kind {0:?}")]
pub struct UnknownWorkloadKind(String);

impl FromStr for WorkloadKind {
    type Err = UnknownWorkloadKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deployment" | "deployments" => Ok(WorkloadKind::Deployment),
            "daemonset" | "daemonsets" => Ok(WorkloadKind::DaemonSet),
            "statefulset" | "statefulsets" => Ok(WorkloadKind::StatefulSet),
            "job" | "jobs" => Ok(WorkloadKind::Job),
            "cronjob" | "cronjobs" => Ok(WorkloadKind::CronJob),
            "rollout" | "rollouts" => Ok(WorkloadKind::Rollout),
            "deploymentconfig" | "deploymentconfigs" => Ok(WorkloadKind::DeploymentConfig),
            other => Err(UnknownWorkloadKind(other.to_string())),
        }
    }
}

/// A fetched workload of any supported kind.
///
/// The wrapped object is the lister's copy; callers that intend to write
/// must clone first (the retry driver always operates on deep copies).
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    StatefulSet(StatefulSet),
    Job(Job),
    CronJob(CronJob),
    Rollout(Rollout),
    DeploymentConfig(DeploymentConfig),
}

impl Workload {
    #[must_use]
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::DaemonSet(_) => WorkloadKind::DaemonSet,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
            Workload::Job(_) => WorkloadKind::Job,
            Workload::CronJob(_) => WorkloadKind::CronJob,
            Workload::Rollout(_) => WorkloadKind::Rollout,
            Workload::DeploymentConfig(_) => WorkloadKind::DeploymentConfig,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(w) => &w.metadata,
            Workload::DaemonSet(w) => &w.metadata,
            Workload::StatefulSet(w) => &w.metadata,
            Workload::Job(w) => &w.metadata,
            Workload::CronJob(w) => &w.metadata,
            Workload::Rollout(w) => &w.metadata,
            Workload::DeploymentConfig(w) => &w.metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Workload::Deployment(w) => &mut w.metadata,
            Workload::DaemonSet(w) => &mut w.metadata,
            Workload::StatefulSet(w) => &mut w.metadata,
            Workload::Job(w) => &mut w.metadata,
            Workload::CronJob(w) => &mut w.metadata,
            Workload::Rollout(w) => &mut w.metadata,
            Workload::DeploymentConfig(w) => &mut w.metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// Annotations on the workload object itself.
    #[must_use]
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        self.metadata()
            .annotations
            .as_ref()
            .unwrap_or(&EMPTY_ANNOTATIONS)
    }

    pub fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.metadata_mut().annotations.get_or_insert_with(BTreeMap::new)
    }

    /// The pod template carried by the workload, if the spec is populated.
    /// For CronJobs this is the template nested inside the job template.
    #[must_use]
    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::DaemonSet(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::StatefulSet(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::Job(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::CronJob(w) => w
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .map(|js| &js.template),
            Workload::Rollout(w) => w.spec.template.as_ref(),
            Workload::DeploymentConfig(w) => w.spec.template.as_ref(),
        }
    }

    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::DaemonSet(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::StatefulSet(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::Job(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::CronJob(w) => w
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .map(|js| &mut js.template),
            Workload::Rollout(w) => w.spec.template.as_mut(),
            Workload::DeploymentConfig(w) => w.spec.template.as_mut(),
        }
    }

    /// Annotations on the pod template.
    #[must_use]
    pub fn pod_template_annotations(&self) -> &BTreeMap<String, String> {
        self.pod_template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref())
            .unwrap_or(&EMPTY_ANNOTATIONS)
    }

    /// Main containers of the pod template.
    #[must_use]
    pub fn containers(&self) -> &[Container] {
        self.pod_template()
            .and_then(|t| t.spec.as_ref())
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
    }

    /// Init containers of the pod template.
    #[must_use]
    pub fn init_containers(&self) -> &[Container] {
        self.pod_template()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.init_containers.as_deref())
            .unwrap_or_default()
    }

    /// Volumes of the pod template.
    #[must_use]
    pub fn volumes(&self) -> &[Volume] {
        self.pod_template()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn execution_strategy(&self) -> ExecutionStrategy {
        self.kind().execution_strategy()
    }

    #[must_use]
    pub fn supports_pause(&self) -> bool {
        self.kind().supports_pause()
    }

    /// Native pause flag, for kinds that have one.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        match self {
            Workload::Deployment(w) => w
                .spec
                .as_ref()
                .and_then(|s| s.paused)
                .unwrap_or_default(),
            Workload::Rollout(w) => w.spec.paused.unwrap_or_default(),
            Workload::DeploymentConfig(w) => w.spec.paused.unwrap_or_default(),
            _ => false,
        }
    }

    /// Set the native pause flag. No-op for kinds without one.
    pub fn set_paused(&mut self, paused: bool) {
        match self {
            Workload::Deployment(w) => {
                if let Some(spec) = w.spec.as_mut() {
                    spec.paused = Some(paused);
                }
            }
            Workload::Rollout(w) => w.spec.paused = Some(paused),
            Workload::DeploymentConfig(w) => w.spec.paused = Some(paused),
            _ => {}
        }
    }

    /// Stamp the Rollout restart timestamp. No-op for other kinds.
    pub fn set_restart_at(&mut self, timestamp: &str) {
        if let Workload::Rollout(w) = self {
            w.spec.restart_at = Some(timestamp.to_string());
        }
    }
}

impl From<Deployment> for Workload {
    fn from(w: Deployment) -> Self {
        Workload::Deployment(w)
    }
}

impl From<DaemonSet> for Workload {
    fn from(w: DaemonSet) -> Self {
        Workload::DaemonSet(w)
    }
}

impl From<StatefulSet> for Workload {
    fn from(w: StatefulSet) -> Self {
        Workload::StatefulSet(w)
    }
}

impl From<Job> for Workload {
    fn from(w: Job) -> Self {
        Workload::Job(w)
    }
}

impl From<CronJob> for Workload {
    fn from(w: CronJob) -> Self {
        Workload::CronJob(w)
    }
}

impl From<Rollout> for Workload {
    fn from(w: Rollout) -> Self {
        Workload::Rollout(w)
    }
}

impl From<DeploymentConfig> for Workload {
    fn from(w: DeploymentConfig) -> Self {
        Workload::DeploymentConfig(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::batch::v1::{CronJobSpec, JobTemplateSpec};
    use k8s_openapi::api::core::v1::PodSpec;

    fn deployment(name: &str) -> Workload {
        Workload::Deployment(Deployment {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("ns-x".into()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "app".into(),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        })
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("deployment".parse::<WorkloadKind>(), Ok(WorkloadKind::Deployment));
        assert_eq!("DaemonSets".parse::<WorkloadKind>(), Ok(WorkloadKind::DaemonSet));
        assert_eq!("cronjobs".parse::<WorkloadKind>(), Ok(WorkloadKind::CronJob));
        assert!("replicaset".parse::<WorkloadKind>().is_err());
    }

    #[test]
    fn test_execution_strategy_per_kind() {
        assert_eq!(
            WorkloadKind::Deployment.execution_strategy(),
            ExecutionStrategy::InPlaceUpdate
        );
        assert_eq!(WorkloadKind::Job.execution_strategy(), ExecutionStrategy::Recreate);
        assert_eq!(
            WorkloadKind::CronJob.execution_strategy(),
            ExecutionStrategy::InstantiateFromTemplate
        );
    }

    #[test]
    fn test_deployment_accessors() {
        let w = deployment("dep-a");
        assert_eq!(w.name(), "dep-a");
        assert_eq!(w.namespace(), "ns-x");
        assert_eq!(w.kind(), WorkloadKind::Deployment);
        assert_eq!(w.containers().len(), 1);
        assert!(w.init_containers().is_empty());
        assert!(w.volumes().is_empty());
    }

    #[test]
    fn test_cronjob_pod_template_is_nested() {
        let w = Workload::CronJob(CronJob {
            spec: Some(CronJobSpec {
                job_template: JobTemplateSpec {
                    spec: Some(k8s_openapi::api::batch::v1::JobSpec {
                        template: PodTemplateSpec {
                            spec: Some(PodSpec {
                                containers: vec![Container {
                                    name: "batch".into(),
                                    ..Container::default()
                                }],
                                ..PodSpec::default()
                            }),
                            ..PodTemplateSpec::default()
                        },
                        ..k8s_openapi::api::batch::v1::JobSpec::default()
                    }),
                    ..JobTemplateSpec::default()
                },
                ..CronJobSpec::default()
            }),
            ..CronJob::default()
        });
        assert_eq!(w.containers().len(), 1);
        assert_eq!(w.containers()[0].name, "batch");
    }

    #[test]
    fn test_pause_flag_round_trip() {
        let mut w = deployment("dep-a");
        assert!(!w.is_paused());
        w.set_paused(true);
        assert!(w.is_paused());
        w.set_paused(false);
        assert!(!w.is_paused());
    }

    #[test]
    fn test_pause_is_noop_for_daemonset() {
        let mut w = Workload::DaemonSet(DaemonSet::default());
        w.set_paused(true);
        assert!(!w.is_paused());
        assert!(!w.supports_pause());
    }

    #[test]
    fn test_restart_at_only_for_rollouts() {
        let mut w = deployment("dep-a");
        w.set_restart_at("2026-01-01T00:00:00Z");
        let mut r = Workload::Rollout(Rollout::new("r", Default::default()));
        r.set_restart_at("2026-01-01T00:00:00Z");
        match r {
            Workload::Rollout(r) => {
                assert_eq!(r.spec.restart_at.as_deref(), Some("2026-01-01T00:00:00Z"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_annotations_mut_initializes_map() {
        let mut w = deployment("dep-a");
        w.annotations_mut()
            .insert("k".to_string(), "v".to_string());
        assert_eq!(w.annotations().get("k").map(String::as_str), Some("v"));
    }
}
