//! Strategy application across every workload kind: the fingerprint
//! must land in the right place (container env, pod-template annotation,
//! or Rollout restartAt) for each kind's template shape, and repeated
//! application must stay idempotent everywhere.

use clap::Parser;
use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use reload_controller::cli::ControllerOptions;
use reload_controller::config::{AnnotationSet, Config};
use reload_controller::matcher::{SourceRef, SourceType};
use reload_controller::strategy::{self, select_strategy, ReloadStrategy};
use reload_controller::workload::{
    deployment_config::DeploymentConfigSpec, rollout::RolloutSpec, DeploymentConfig, Rollout,
    Workload, WorkloadKind,
};

const ALL_KINDS: [WorkloadKind; 7] = [
    WorkloadKind::Deployment,
    WorkloadKind::DaemonSet,
    WorkloadKind::StatefulSet,
    WorkloadKind::Job,
    WorkloadKind::CronJob,
    WorkloadKind::Rollout,
    WorkloadKind::DeploymentConfig,
];

fn keys() -> AnnotationSet {
    AnnotationSet::new("reloader.microscaler.io")
}

fn config() -> Config {
    Config::from_options(&ControllerOptions::parse_from(["reload-controller"])).unwrap()
}

fn source(hash: &str) -> SourceRef {
    SourceRef {
        kind: SourceType::Secret,
        name: "db-credentials".to_string(),
        namespace: "ns-x".to_string(),
        hash: hash.to_string(),
        match_enabled: false,
    }
}

fn workload_of(kind: WorkloadKind) -> Workload {
    let metadata = ObjectMeta {
        name: Some("target".into()),
        namespace: Some("ns-x".into()),
        ..ObjectMeta::default()
    };
    let template = PodTemplateSpec {
        spec: Some(PodSpec {
            containers: vec![
                Container {
                    name: "app".into(),
                    ..Container::default()
                },
                Container {
                    name: "sidecar".into(),
                    ..Container::default()
                },
            ],
            init_containers: Some(vec![Container {
                name: "init".into(),
                ..Container::default()
            }]),
            ..PodSpec::default()
        }),
        ..PodTemplateSpec::default()
    };
    match kind {
        WorkloadKind::Deployment => Workload::Deployment(Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                template,
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }),
        WorkloadKind::DaemonSet => Workload::DaemonSet(DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                template,
                ..DaemonSetSpec::default()
            }),
            ..DaemonSet::default()
        }),
        WorkloadKind::StatefulSet => Workload::StatefulSet(StatefulSet {
            metadata,
            spec: Some(StatefulSetSpec {
                template,
                ..StatefulSetSpec::default()
            }),
            ..StatefulSet::default()
        }),
        WorkloadKind::Job => Workload::Job(Job {
            metadata,
            spec: Some(JobSpec {
                template,
                ..JobSpec::default()
            }),
            ..Job::default()
        }),
        WorkloadKind::CronJob => Workload::CronJob(CronJob {
            metadata,
            spec: Some(CronJobSpec {
                job_template: JobTemplateSpec {
                    spec: Some(JobSpec {
                        template,
                        ..JobSpec::default()
                    }),
                    ..JobTemplateSpec::default()
                },
                ..CronJobSpec::default()
            }),
            ..CronJob::default()
        }),
        WorkloadKind::Rollout => Workload::Rollout(Rollout {
            metadata,
            spec: RolloutSpec {
                template: Some(template),
                ..RolloutSpec::default()
            },
        }),
        WorkloadKind::DeploymentConfig => Workload::DeploymentConfig(DeploymentConfig {
            metadata,
            spec: DeploymentConfigSpec {
                template: Some(template),
                ..DeploymentConfigSpec::default()
            },
        }),
    }
}

#[test]
fn env_strategy_reaches_every_container_of_every_kind() {
    for kind in ALL_KINDS {
        let mut w = workload_of(kind);
        assert!(
            strategy::apply(&mut w, &source("aaaa000011112222"), ReloadStrategy::EnvVars, &keys()),
            "{kind}: first application must change the workload"
        );

        let mut seen = 0;
        for container in w.containers().iter().chain(w.init_containers()) {
            let env = container
                .env
                .as_ref()
                .unwrap_or_else(|| panic!("{kind}: {} has no env", container.name));
            let injected = env
                .iter()
                .find(|e| e.name == "RELOADER_DB_CREDENTIALS_SECRET")
                .unwrap_or_else(|| panic!("{kind}: {} missing fingerprint", container.name));
            assert_eq!(injected.value.as_deref(), Some("aaaa000011112222"));
            seen += 1;
        }
        assert_eq!(seen, 3, "{kind}: app, sidecar and init containers");
    }
}

#[test]
fn env_strategy_is_idempotent_for_every_kind() {
    for kind in ALL_KINDS {
        let mut w = workload_of(kind);
        assert!(strategy::apply(
            &mut w,
            &source("aaaa000011112222"),
            ReloadStrategy::EnvVars,
            &keys()
        ));
        assert!(
            !strategy::apply(&mut w, &source("aaaa000011112222"), ReloadStrategy::EnvVars, &keys()),
            "{kind}: same hash must be a no-op"
        );
        assert!(
            strategy::apply(&mut w, &source("bbbb000011112222"), ReloadStrategy::EnvVars, &keys()),
            "{kind}: new hash must change the workload again"
        );
    }
}

#[test]
fn annotation_strategy_stamps_the_template_of_every_kind() {
    for kind in ALL_KINDS {
        let mut w = workload_of(kind);
        assert!(strategy::apply(
            &mut w,
            &source("cccc000011112222"),
            ReloadStrategy::Annotations,
            &keys()
        ));
        assert_eq!(
            w.pod_template_annotations()
                .get("reloader.microscaler.io/last-reloaded-at")
                .map(String::as_str),
            Some("cccc000011112222"),
            "{kind}: template annotation missing"
        );
        assert_eq!(
            w.pod_template_annotations()
                .get("reloader.microscaler.io/last-reloaded-from")
                .map(String::as_str),
            Some("Secret/ns-x/db-credentials")
        );
        assert!(!strategy::apply(
            &mut w,
            &source("cccc000011112222"),
            ReloadStrategy::Annotations,
            &keys()
        ));
    }
}

#[test]
fn restart_override_selects_restart_only_on_rollouts() {
    let cfg = config();
    for kind in ALL_KINDS {
        let mut w = workload_of(kind);
        w.annotations_mut().insert(
            "reloader.microscaler.io/reload-strategy".to_string(),
            "restart".to_string(),
        );
        let selected = select_strategy(&w, cfg.reload_strategy, &keys());
        if kind == WorkloadKind::Rollout {
            assert_eq!(selected, ReloadStrategy::Restart);
        } else {
            assert_eq!(selected, cfg.reload_strategy, "{kind}: restart is Rollout-only");
        }
    }
}

#[test]
fn restart_strategy_stamps_restart_at_without_touching_template() {
    let mut w = workload_of(WorkloadKind::Rollout);
    assert!(strategy::apply(
        &mut w,
        &source("dddd000011112222"),
        ReloadStrategy::Restart,
        &keys()
    ));

    let Workload::Rollout(rollout) = &w else {
        unreachable!()
    };
    assert!(rollout.spec.restart_at.is_some());
    // Template untouched: no env vars, no template annotations
    assert!(w.containers().iter().all(|c| c.env.is_none()));
    assert!(w.pod_template_annotations().is_empty());
    // Fingerprint tracked on the workload itself keeps it idempotent
    assert!(!strategy::apply(
        &mut w,
        &source("dddd000011112222"),
        ReloadStrategy::Restart,
        &keys()
    ));
}
