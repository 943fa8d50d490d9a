//! # Reload Controller
//!
//! A Kubernetes controller that watches ConfigMaps and Secrets and
//! performs rolling restarts of the workloads that consume them when
//! their content changes.
//!
//! Startup wiring: crypto provider, tracing, metrics registry, the
//! probes/metrics HTTP server, the Kubernetes client, optional leader
//! election, and then the controllers (ConfigMap, Secret, namespace
//! cache, pause scheduler) until a termination signal arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::Client;
use tracing::{error, info, warn};

use reload_controller::cli::ControllerOptions;
use reload_controller::config::Config;
use reload_controller::constants::{
    DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use reload_controller::controller::{
    configmap::run_configmap_controller, namespace::run_namespace_watcher,
    pause::run_pause_controllers, secret::run_secret_controller, Context,
};
use reload_controller::leader::LeaderElection;
use reload_controller::observability::metrics;
use reload_controller::server::{start_server, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reload_controller=info".into()),
        )
        .init();

    info!("Starting Reload Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let options = ControllerOptions::parse();
    let config = Arc::new(Config::from_options(&options).context("invalid configuration")?);
    info!(
        "Watching kinds: {:?}; strategy: {}; annotation prefix: {}",
        config.enabled_workload_kinds(),
        config.reload_strategy,
        config.annotations.prefix
    );

    metrics::register_metrics().context("failed to register metrics")?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_port = config.metrics_port;
    let server_state_for_server = server_state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(server_port, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    // Hold the lease before touching any workload
    let leader = if config.enable_leader_election {
        let election = LeaderElection::new(client.clone(), config.clone());
        election.acquire().await?;
        Some(election)
    } else {
        None
    };

    let ctx = Arc::new(Context::new(client, config.clone()));

    if config.namespace_selectors_enabled() {
        let namespace_ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = run_namespace_watcher(namespace_ctx).await {
                error!("Namespace watcher stopped: {:#}", e);
            }
        });
    }

    server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Controller initialized, starting watch loops");

    let controllers = async {
        tokio::try_join!(
            run_configmap_controller(ctx.clone()),
            run_secret_controller(ctx.clone()),
            run_pause_controllers(ctx.clone()),
        )
    };

    let outcome = if let Some(election) = &leader {
        tokio::select! {
            () = shutdown_signal() => Ok(()),
            result = controllers => result.map(|_| ()),
            held = election.hold() => {
                held.context("leadership lost; shutting down")
            }
        }
    } else {
        tokio::select! {
            () = shutdown_signal() => Ok(()),
            result = controllers => result.map(|_| ()),
        }
    };

    server_state.is_ready.store(false, Ordering::Relaxed);
    if let Some(election) = &leader {
        election.release().await;
    }

    match outcome {
        Ok(()) => {
            info!("Controller stopped");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed: {:#}", e);
            Err(e)
        }
    }
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Poll until the HTTP server accepts connections so readiness probes
/// pass as soon as the process reports healthy.
async fn wait_for_server_ready(
    port: u16,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
