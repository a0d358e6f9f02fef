//! # Watch Loop
//!
//! Runs the ManagedCluster controller until shutdown.
//!
//! - `kube_runtime::Controller` watches ManagedClusters, keeps the cache
//!   current and syncs each cached cluster with at most one pass in flight
//!   per cluster. Requeues and error backoff go through its scheduler.
//! - A periodic resync re-runs every cached cluster so cleanup that stalled
//!   on an external dependency is retried even without events.
//! - Clusters whose record is already gone are handled by the absent-record
//!   passes in `absent.rs`.

use crate::crd::ManagedCluster;
use crate::error::Error;
use crate::runtime::absent::spawn_absent_passes;
use crate::runtime::error_policy::{handle_sync_error, ErrorPolicy};
use crate::runtime::initialization::InitializationResult;
use crate::runtime::reconcile::{reconcile, Context};
use futures::{Stream, StreamExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Run the controller until SIGINT/SIGTERM
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        config,
        gc,
        controller,
        clusters,
        cache,
        server_state,
        server_handle,
        shutdown,
    } = init;

    let policy = Arc::new(ErrorPolicy::new(config.backoff_min_secs, config.backoff_max_secs));

    let signal_handle = {
        let shutdown = shutdown.clone();
        let server_state = server_state.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
            server_state.set_ready(false);
            shutdown.cancel();
        })
    };

    info!("Starting controller watch loop...");
    let absent_handle = spawn_absent_passes(
        clusters,
        gc.clone(),
        Arc::new(cache),
        policy.clone(),
        shutdown.clone(),
    );

    let mut controller = controller.graceful_shutdown_on(shutdown.clone().cancelled_owned());
    if let Some(interval) = config.resync_interval() {
        controller = controller.reconcile_all_on(resync_ticks(interval));
    }
    controller
        .run(reconcile, handle_sync_error, Arc::new(Context { gc, policy }))
        .for_each(|result| async move { log_outcome(result) })
        .await;

    // The controller also stops when its watch ends for good
    server_state.set_ready(false);
    shutdown.cancel();
    signal_handle.abort();

    if let Err(e) = absent_handle.await {
        error!("absent-record task panicked: {}", e);
    }
    if let Err(e) = server_handle.await {
        error!("HTTP server task panicked: {}", e);
    }
    info!("Controller stopped");
    Ok(())
}

/// A tick every `interval`, the first one after a full interval
pub fn resync_ticks(interval: Duration) -> impl Stream<Item = ()> + Send + Sync + 'static {
    futures::stream::unfold((), move |()| async move {
        tokio::time::sleep(interval).await;
        debug!("periodic resync");
        Some(((), ()))
    })
}

fn log_outcome(
    result: Result<(ObjectRef<ManagedCluster>, Action), controller::Error<Error, watcher::Error>>,
) {
    match result {
        Ok((cluster, action)) => debug!(cluster = %cluster.name, ?action, "sync finished"),
        Err(controller::Error::ObjectNotFound(cluster)) => {
            debug!(cluster = %cluster.name, "cluster left the cache before its sync");
        }
        // Already logged by the error policy
        Err(controller::Error::ReconcilerFailed(_, cluster)) => {
            debug!(cluster = %cluster.name, "sync failed, retry scheduled");
        }
        Err(e) => warn!("ManagedCluster controller error: {}", e),
    }
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
