//! # OpenShift DeploymentConfig
//!
//! Partial typed view of the `apps.openshift.io/v1` DeploymentConfig
//! resource, modeling the pod template and the native `paused` field.
//! Unknown spec fields round-trip through `extra` so updates written by
//! this controller never strip configuration it does not model.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "apps.openshift.io",
    version = "v1",
    kind = "DeploymentConfig",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    /// Native pause flag honored by the OpenShift deployment controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    /// Fields of the spec this controller does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
