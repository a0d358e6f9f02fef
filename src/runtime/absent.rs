//! # Absent-Record Passes
//!
//! The controller runtime only reconciles clusters present in its cache. A
//! ManagedCluster whose record is gone still gets cleanup passes keyed by its
//! name: deletions seen on a dedicated watch are fed into a
//! `kube_runtime::scheduler`, which also carries the requeues and error
//! backoff of those passes. Passes run one at a time.

use crate::crd::ManagedCluster;
use crate::gc::{GcController, Requeuer};
use crate::runtime::error_policy::ErrorPolicy;
use crate::store::ClusterCache;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::scheduler::{scheduler, ScheduleRequest};
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sending half of the absent-record scheduler
#[derive(Debug, Clone)]
pub struct AbsentQueue {
    sender: UnboundedSender<ScheduleRequest<String>>,
}

impl AbsentQueue {
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<ScheduleRequest<String>>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }

    /// Schedule a pass right away
    pub fn add(&self, name: &str) {
        self.add_after(name, Duration::ZERO);
    }
}

impl Requeuer for AbsentQueue {
    fn add_after(&self, key: &str, delay: Duration) {
        let request = ScheduleRequest {
            message: key.to_string(),
            run_at: Instant::now() + delay,
        };
        if self.sender.unbounded_send(request).is_err() {
            debug!(cluster = %key, "absent-record scheduler stopped, dropping request");
        }
    }
}

/// Run one cleanup pass for a cluster whose record left the cache
///
/// A cluster that was recreated meanwhile belongs to the controller again
/// and is skipped.
pub async fn run_absent_pass(
    gc: &GcController,
    cache: &dyn ClusterCache,
    policy: &ErrorPolicy,
    queue: &AbsentQueue,
    name: &str,
) {
    if cache.get(name).is_some_and(|cluster| !cluster.is_deleting()) {
        debug!(cluster = %name, "cluster recreated, skipping absent-record pass");
        return;
    }
    match gc.sync(name, queue).await {
        Ok(()) => policy.forget(name),
        Err(e) => {
            warn!(cluster = %name, error = %e, "absent-record pass failed");
            queue.add_after(name, policy.next_delay(name));
        }
    }
}

/// Watch for deleted ManagedClusters and run their absent-record passes
pub fn spawn_absent_passes(
    clusters: Api<ManagedCluster>,
    gc: Arc<GcController>,
    cache: Arc<dyn ClusterCache>,
    policy: Arc<ErrorPolicy>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (queue, requests) = AbsentQueue::new();
        let deletions = watcher(clusters, watcher::Config::default()).default_backoff();
        let due = scheduler(requests);
        futures::pin_mut!(deletions, due);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = deletions.next() => match event {
                    Some(Ok(watcher::Event::Delete(cluster))) => {
                        info!(cluster = %cluster.name_any(), "cluster record removed, scheduling cleanup pass");
                        queue.add(&cluster.name_any());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => warn!("ManagedCluster deletion watch error: {}", e),
                    None => {
                        warn!("ManagedCluster deletion watch ended");
                        break;
                    }
                },
                Some(name) = due.next() => {
                    run_absent_pass(&gc, cache.as_ref(), &policy, &queue, &name).await;
                }
            }
        }
        debug!("absent-record passes stopped");
    })
}
