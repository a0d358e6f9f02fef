//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing,
//! metrics, server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::crd::ManagedCluster;
use crate::gc::GcController;
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::store;
use anyhow::{Context, Result};
use kube::{api::Api, Client};
use kube_runtime::controller::{self, Controller};
use kube_runtime::reflector::Store;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    pub config: ControllerConfig,
    pub gc: Arc<GcController>,
    /// Not yet running; owns the watch that fills `cache`
    pub controller: Controller<ManagedCluster>,
    /// API the deletion watch lists and watches
    pub clusters: Api<ManagedCluster>,
    /// Reader side of the controller's ManagedCluster cache
    pub cache: Store<ManagedCluster>,
    pub server_state: Arc<ServerState>,
    pub server_handle: JoinHandle<()>,
    /// Cancelled on shutdown; stops the server, the controller and the absent-record passes
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("gc", &self.gc)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - GC controller setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any client is built; rustls 0.23 has no implicit provider
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(&config.log_format)?;
    if !provider_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting ManagedCluster GC Controller");
    info!(
        "Build info: timestamp={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        resource_cleanup_enabled = config.resource_cleanup_enabled,
        gc_resource_list = ?config.gc_resource_list,
        workers = config.workers,
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = server_state.clone();
        let shutdown = shutdown.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let clusters: Api<ManagedCluster> = Api::all(client.clone());

    let concurrency = u16::try_from(config.workers).unwrap_or(u16::MAX);
    let controller = Controller::new(clusters.clone(), watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency));
    let cache = controller.store();

    let clients = store::kube::clients(client, cache.clone());
    let gc = Arc::new(GcController::from_config(&config, clients));
    info!(
        reconcilers = ?gc.reconciler_names(),
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        config,
        gc,
        controller,
        clusters,
        cache,
        server_state,
        server_handle,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
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
