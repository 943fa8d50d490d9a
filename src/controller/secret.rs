//! # Secret Controller
//!
//! Watches Secrets and reloads the workloads that consume them.

use std::sync::Arc;

use anyhow::Result;
use k8s_openapi::api::core::v1::Secret;

use crate::controller::source::{run_source_controller, ReloadSource};
use crate::controller::{Context, SourceState};
use crate::hash;
use crate::matcher::SourceType;

impl ReloadSource for Secret {
    const RESOURCE_TYPE: &'static str = "secret";

    fn source_type() -> SourceType {
        SourceType::Secret
    }

    fn content_hash(&self) -> String {
        hash::hash_secret(self)
    }

    fn empty_content_hash() -> String {
        hash::hash_secret(&Secret::default())
    }

    fn state(ctx: &Context) -> &Arc<SourceState> {
        &ctx.secret_state
    }
}

pub async fn run_secret_controller(ctx: Arc<Context>) -> Result<()> {
    run_source_controller::<Secret>(ctx).await
}
