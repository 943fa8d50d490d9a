//! # ConfigMap Controller
//!
//! Watches ConfigMaps and reloads the workloads that consume them.

use std::sync::Arc;

use anyhow::Result;
use k8s_openapi::api::core::v1::ConfigMap;

use crate::controller::source::{run_source_controller, ReloadSource};
use crate::controller::{Context, SourceState};
use crate::hash;
use crate::matcher::SourceType;

impl ReloadSource for ConfigMap {
    const RESOURCE_TYPE: &'static str = "configmap";

    fn source_type() -> SourceType {
        SourceType::ConfigMap
    }

    fn content_hash(&self) -> String {
        hash::hash_configmap(self)
    }

    fn empty_content_hash() -> String {
        hash::hash_configmap(&ConfigMap::default())
    }

    fn state(ctx: &Context) -> &Arc<SourceState> {
        &ctx.configmap_state
    }
}

pub async fn run_configmap_controller(ctx: Arc<Context>) -> Result<()> {
    run_source_controller::<ConfigMap>(ctx).await
}
