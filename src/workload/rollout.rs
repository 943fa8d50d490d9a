//! # Argo Rollout
//!
//! Partial typed view of the `argoproj.io/v1alpha1` Rollout resource.
//!
//! Only the fields the controller reads or writes are modeled: the pod
//! template, the native `paused` field, and `restartAt`. Stamping a fresh
//! timestamp into `restartAt` makes the Argo rollout controller restart
//! pods without a spec change; the alternative is the usual pod-template
//! mutation. Unknown fields are preserved across updates via the
//! `extra` passthrough so a partial view never strips user configuration.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Value of the reload-strategy annotation selecting the restartAt path.
pub const STRATEGY_RESTART: &str = "restart";

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Rollout",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    /// Native pause flag honored by the Argo rollout controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    /// RFC3339 timestamp; changing it triggers a restart-only rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_at: Option<String>,
    /// Fields of the spec this controller does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
