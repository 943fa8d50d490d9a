//! End-to-end tests over the pure reload pipeline: content hashing,
//! matching, strategy application, and pause bookkeeping, using
//! in-memory objects without a cluster.

use clap::Parser;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use reload_controller::cli::ControllerOptions;
use reload_controller::config::Config;
use reload_controller::hash::hash_configmap;
use reload_controller::matcher::{match_workload, MatchReason, SourceRef, SourceType};
use reload_controller::pause;
use reload_controller::strategy::{self, ReloadStrategy};
use reload_controller::workload::Workload;

fn config(args: &[&str]) -> Config {
    let mut argv = vec!["reload-controller"];
    argv.extend_from_slice(args);
    Config::from_options(&ControllerOptions::parse_from(argv)).unwrap()
}

fn configmap(name: &str, namespace: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..ConfigMap::default()
    }
}

fn source_for(cm: &ConfigMap) -> SourceRef {
    SourceRef {
        kind: SourceType::ConfigMap,
        name: cm.metadata.name.clone().unwrap(),
        namespace: cm.metadata.namespace.clone().unwrap(),
        hash: hash_configmap(cm),
        match_enabled: cm
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get("reloader.microscaler.io/match"))
            .is_some_and(|v| v == "true"),
    }
}

fn deployment(
    name: &str,
    namespace: &str,
    annotations: &[(&str, &str)],
    volumes: Vec<Volume>,
) -> Workload {
    Workload::Deployment(Deployment {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "app".into(),
                        ..Container::default()
                    }],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..PodSpec::default()
                }),
                ..PodTemplateSpec::default()
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    })
}

fn config_volume(volume_name: &str, cm_name: &str) -> Volume {
    Volume {
        name: volume_name.into(),
        config_map: Some(ConfigMapVolumeSource {
            name: cm_name.into(),
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }
}

#[test]
fn explicit_configmap_update_injects_new_hash() {
    // Config cm-a in ns-x moves from {k:v1} to {k:v2}; dep-a lists it
    let cfg = config(&[]);
    let cm_v2 = configmap("cm-a", "ns-x", &[("k", "v2")]);
    let source = source_for(&cm_v2);

    let dep = deployment(
        "dep-a",
        "ns-x",
        &[("reloader.microscaler.io/configmap-reload", "cm-a")],
        vec![],
    );

    let decision = match_workload(&source, &dep, &cfg).expect("dep-a must match");
    assert_eq!(decision.reason, MatchReason::ExplicitNameMatch);
    assert_eq!(decision.hash, hash_configmap(&cm_v2));

    let mut target = decision.workload.clone();
    let changed = strategy::apply(
        &mut target,
        &source,
        ReloadStrategy::EnvVars,
        &cfg.annotations,
    );
    assert!(changed);
    let env = target.containers()[0].env.as_ref().unwrap();
    let injected = env
        .iter()
        .find(|e| e.name == "RELOADER_CM_A_CONFIGMAP")
        .expect("fingerprint env var present");
    assert_eq!(injected.value.as_deref(), Some(hash_configmap(&cm_v2).as_str()));
}

#[test]
fn auto_annotation_discovers_mounted_volume() {
    let cfg = config(&[]);
    let cm = configmap("cm-b", "ns-x", &[("conf", "x")]);
    let source = source_for(&cm);

    let dep = deployment(
        "dep-b",
        "ns-x",
        &[("reloader.microscaler.io/auto", "true")],
        vec![config_volume("conf", "cm-b")],
    );

    let decision = match_workload(&source, &dep, &cfg).expect("volume reference must match");
    assert_eq!(decision.reason, MatchReason::AutoDiscoveredVolume);
    assert!(decision.auto_reload);
}

#[test]
fn search_annotation_pairs_with_match_annotation() {
    let cfg = config(&[]);
    let mut cm = configmap("cm-c", "ns-x", &[("k", "v")]);
    cm.metadata.annotations = Some(BTreeMap::from([(
        "reloader.microscaler.io/match".to_string(),
        "true".to_string(),
    )]));
    let source = source_for(&cm);

    let dep = deployment(
        "dep-c",
        "ns-x",
        &[("reloader.microscaler.io/search", "true")],
        vec![],
    );

    let decision = match_workload(&source, &dep, &cfg).expect("search/match pair must match");
    assert_eq!(decision.reason, MatchReason::ExplicitSearchMatch);
}

#[test]
fn deleted_resource_reloads_with_empty_content_hash() {
    // The hash a deleted ConfigMap reloads consumers with is the hash of
    // empty content: stable, and distinct from any non-empty content
    let empty = hash_configmap(&ConfigMap::default());
    assert_eq!(empty, hash_configmap(&ConfigMap::default()));
    assert_ne!(
        empty,
        hash_configmap(&configmap("cm-d", "ns-x", &[("k", "v")]))
    );
}

#[test]
fn reconcile_is_idempotent_per_hash() {
    let cfg = config(&[]);
    let cm = configmap("cm-a", "ns-x", &[("k", "v1")]);
    let source = source_for(&cm);

    let mut dep = deployment(
        "dep-a",
        "ns-x",
        &[("reloader.microscaler.io/configmap-reload", "cm-a")],
        vec![],
    );

    assert!(strategy::apply(
        &mut dep,
        &source,
        ReloadStrategy::EnvVars,
        &cfg.annotations
    ));
    // No intervening change: the second pass must not report a write
    assert!(!strategy::apply(
        &mut dep,
        &source,
        ReloadStrategy::EnvVars,
        &cfg.annotations
    ));
}

#[test]
fn at_most_one_injected_env_var_per_source() {
    let cfg = config(&[]);
    let mut dep = deployment("dep-a", "ns-x", &[], vec![]);

    let v1 = configmap("cm-a", "ns-x", &[("k", "v1")]);
    let v2 = configmap("cm-a", "ns-x", &[("k", "v2")]);
    let source_v1 = source_for(&v1);
    let source_v2 = source_for(&v2);

    strategy::apply(&mut dep, &source_v1, ReloadStrategy::EnvVars, &cfg.annotations);
    strategy::apply(&mut dep, &source_v2, ReloadStrategy::EnvVars, &cfg.annotations);

    let env = dep.containers()[0].env.as_ref().unwrap();
    let injected: Vec<_> = env
        .iter()
        .filter(|e| e.name == "RELOADER_CM_A_CONFIGMAP")
        .collect();
    assert_eq!(injected.len(), 1, "one managed env var per source resource");
    assert_eq!(injected[0].value.as_deref(), Some(source_v2.hash.as_str()));
}

#[test]
fn matcher_never_crosses_namespaces() {
    let cfg = config(&["--auto-reload-all"]);
    let cm = configmap("cm-a", "ns-x", &[("k", "v")]);
    let source = source_for(&cm);

    let other_ns = deployment(
        "dep-a",
        "ns-y",
        &[("reloader.microscaler.io/configmap-reload", "cm-a")],
        vec![config_volume("conf", "cm-a")],
    );
    assert!(match_workload(&source, &other_ns, &cfg).is_none());
}

#[test]
fn pause_round_trip_on_reload() {
    let cfg = config(&[]);
    let cm = configmap("cm-f", "ns-x", &[("k", "v")]);
    let source = source_for(&cm);

    let mut dep = deployment(
        "dep-f",
        "ns-x",
        &[
            ("reloader.microscaler.io/auto", "true"),
            ("reloader.microscaler.io/pause-period", "5m"),
        ],
        vec![config_volume("conf", "cm-f")],
    );

    // The reload write carries the pause state with it
    assert!(strategy::apply(
        &mut dep,
        &source,
        ReloadStrategy::EnvVars,
        &cfg.annotations
    ));
    assert!(pause::attach_pause(&mut dep, &cfg.annotations, None));
    assert!(dep.is_paused());
    assert!(pause::is_paused_by_reloader(&dep, &cfg.annotations));

    let stamped = dep
        .annotations()
        .get("reloader.microscaler.io/paused-at")
        .expect("paused-at stamped")
        .clone();
    let paused_at = chrono::DateTime::parse_from_rfc3339(&stamped).unwrap();

    // Still paused just before expiry
    let just_before = paused_at + chrono::Duration::seconds(299);
    assert!(pause::remaining_pause(
        &dep,
        &cfg.annotations,
        None,
        just_before.with_timezone(&chrono::Utc)
    )
    .is_some());

    // Expired afterwards; clearing restores the unpaused state
    let after = paused_at + chrono::Duration::seconds(301);
    assert!(pause::remaining_pause(
        &dep,
        &cfg.annotations,
        None,
        after.with_timezone(&chrono::Utc)
    )
    .is_none());
    assert!(pause::clear_pause(&mut dep, &cfg.annotations));
    assert!(!dep.is_paused());
    assert!(!pause::is_paused_by_reloader(&dep, &cfg.annotations));
}

#[test]
fn metadata_churn_does_not_change_the_hash() {
    let plain = configmap("cm-a", "ns-x", &[("k", "v")]);
    let mut relabeled = plain.clone();
    relabeled.metadata.labels = Some(BTreeMap::from([(
        "team".to_string(),
        "core".to_string(),
    )]));
    relabeled.metadata.resource_version = Some("99".into());
    assert_eq!(hash_configmap(&plain), hash_configmap(&relabeled));
}

#[test]
fn annotation_strategy_stamps_pod_template() {
    let cfg = config(&[]);
    let cm = configmap("cm-a", "ns-x", &[("k", "v2")]);
    let source = source_for(&cm);

    let mut dep = deployment(
        "dep-a",
        "ns-x",
        &[("reloader.microscaler.io/configmap-reload", "cm-a")],
        vec![],
    );

    assert!(strategy::apply(
        &mut dep,
        &source,
        ReloadStrategy::Annotations,
        &cfg.annotations
    ));
    let annotations = dep.pod_template_annotations();
    assert_eq!(
        annotations
            .get("reloader.microscaler.io/last-reloaded-at")
            .map(String::as_str),
        Some(source.hash.as_str())
    );
    assert_eq!(
        annotations
            .get("reloader.microscaler.io/last-reloaded-from")
            .map(String::as_str),
        Some("ConfigMap/ns-x/cm-a")
    );
    // Env-var path untouched under the annotation strategy
    assert!(dep.containers()[0].env.is_none());
}
