//! # Garbage Collection
//!
//! Keeps a cleanup finalizer on every live ManagedCluster and, once a
//! cluster is deleted, runs an ordered chain of cleanup reconcilers before
//! letting the record go.
//!
//! ## Module Structure
//!
//! - `resources.rs` - Deletes dependent resources in the cluster namespace by type
//! - `rbac.rs` - Deletes RBAC bound to the cluster identity and pending ManifestWorks
//!
//! ## Pass Semantics
//!
//! Each reconciler reports an outcome and any errors it hit:
//!
//! - `Continue` - move on to the next reconciler
//! - `Requeue` - keep going, but deliver the cluster again after a fixed delay
//! - `Stop` - skip the remaining reconcilers for this pass
//!
//! Errors of all reconcilers that ran are aggregated into a `Deleting`
//! condition on the cluster. The finalizer is removed only after a pass with
//! no errors and no requeue.

mod rbac;
mod resources;

pub use rbac::{
    cluster_role_name, references_cluster, registration_role_binding_name, work_role_binding_name,
    RbacGcReconciler,
};
pub use resources::{parse_descriptors, ResourceGcReconciler, ResourceTypeDescriptor};

use crate::config::ControllerConfig;
use crate::constants::{CLUSTER_CLEANUP_FINALIZER, CONDITION_DELETING, REASON_RESOURCE_ERROR};
use crate::crd::{set_status_condition, Condition, ConditionStatus, ManagedCluster};
use crate::error::{join_errors, AggregateError, Error, Result};
use crate::observability::metrics;
use crate::patcher::ClusterPatcher;
use crate::store::{ClusterCache, GcClients};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// What the chain should do after a reconciler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Requeue,
    Stop,
    Continue,
}

/// Outcome of one reconciler plus every error it collected
#[derive(Debug)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub errors: Vec<Error>,
}

impl ReconcileReport {
    #[must_use]
    pub fn new(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_errors(outcome: ReconcileOutcome, errors: Vec<Error>) -> Self {
        Self { outcome, errors }
    }
}

/// One stage of the cleanup chain
///
/// `cluster` is `None` when the record is already gone from the cache; the
/// stage must still clean up by `cluster_namespace`. Stages may set
/// conditions on the snapshot; they are persisted by the controller.
#[async_trait]
pub trait GcReconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(
        &self,
        cluster: Option<&mut ManagedCluster>,
        cluster_namespace: &str,
    ) -> ReconcileReport;
}

/// Delayed re-delivery of a cluster name
pub trait Requeuer: Send + Sync {
    fn add_after(&self, key: &str, delay: Duration);
}

/// Drives the finalizer and the reconciler chain for one cluster at a time
pub struct GcController {
    cache: Arc<dyn ClusterCache>,
    patcher: ClusterPatcher,
    reconcilers: Vec<Box<dyn GcReconciler>>,
    requeue_delay: Duration,
}

impl fmt::Debug for GcController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcController")
            .field("reconcilers", &self.reconciler_names())
            .field("requeue_delay", &self.requeue_delay)
            .finish_non_exhaustive()
    }
}

impl GcController {
    #[must_use]
    pub fn new(
        cache: Arc<dyn ClusterCache>,
        patcher: ClusterPatcher,
        reconcilers: Vec<Box<dyn GcReconciler>>,
        requeue_delay: Duration,
    ) -> Self {
        Self {
            cache,
            patcher,
            reconcilers,
            requeue_delay,
        }
    }

    /// Build the controller and its reconciler chain
    ///
    /// Resource-type GC only joins the chain when cleanup is enabled and at
    /// least one resource type is configured; RBAC cleanup always runs.
    #[must_use]
    pub fn from_config(config: &ControllerConfig, clients: GcClients) -> Self {
        let mut reconcilers: Vec<Box<dyn GcReconciler>> = Vec::new();

        if config.resource_cleanup_enabled && !config.gc_resource_list.is_empty() {
            let resources = config.gc_resources();
            info!(
                resource_types = resources.len(),
                "resource cleanup enabled"
            );
            reconcilers.push(Box::new(ResourceGcReconciler::new(
                clients.metadata.clone(),
                resources.into(),
            )));
        }

        reconcilers.push(Box::new(RbacGcReconciler::new(
            clients.rbac.clone(),
            clients.works.clone(),
            clients.authorizer.clone(),
            config.resource_cleanup_enabled,
        )));

        Self::new(
            clients.cache,
            ClusterPatcher::new(clients.store, config.conflict_retries),
            reconcilers,
            config.requeue_delay(),
        )
    }

    /// Names of the reconcilers in chain order
    #[must_use]
    pub fn reconciler_names(&self) -> Vec<&'static str> {
        self.reconcilers.iter().map(|r| r.name()).collect()
    }

    /// Process one cluster name taken from the queue
    pub async fn sync(&self, name: &str, queue: &dyn Requeuer) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        let span = info_span!("gc.sync", cluster = %name);
        async move {
            let start = Instant::now();
            metrics::increment_syncs();
            let result = self.sync_cluster(name, queue).await;
            metrics::observe_sync_duration(start.elapsed().as_secs_f64());
            if result.is_err() {
                metrics::increment_sync_errors();
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn sync_cluster(&self, name: &str, queue: &dyn Requeuer) -> Result<()> {
        // A missing record means the cluster is gone but cleanup may not be
        let original = self.cache.get(name);

        if let Some(cluster) = original.as_deref() {
            if !cluster.is_deleting() {
                if self
                    .patcher
                    .add_finalizer(cluster, CLUSTER_CLEANUP_FINALIZER)
                    .await?
                {
                    metrics::increment_finalizers_added();
                    info!("added cleanup finalizer");
                }
                return Ok(());
            }
        }

        let mut snapshot = original.as_deref().cloned();
        let mut errors = Vec::new();
        let mut requeue = false;

        for reconciler in &self.reconcilers {
            let report = reconciler.reconcile(snapshot.as_mut(), name).await;
            if !report.errors.is_empty() {
                warn!(
                    reconciler = reconciler.name(),
                    errors = report.errors.len(),
                    "cleanup stage reported errors"
                );
            }
            errors.extend(report.errors);
            match report.outcome {
                ReconcileOutcome::Requeue => requeue = true,
                ReconcileOutcome::Stop => {
                    debug!(reconciler = reconciler.name(), "cleanup chain stopped");
                    break;
                }
                ReconcileOutcome::Continue => {}
            }
        }

        if requeue {
            debug!(delay_secs = self.requeue_delay.as_secs(), "cleanup incomplete, requeueing");
            metrics::increment_requeues();
            queue.add_after(name, self.requeue_delay);
        }

        let (Some(original), Some(mut snapshot)) = (original, snapshot) else {
            return match AggregateError::from_errors(errors) {
                Some(aggregate) => Err(aggregate.into()),
                None => Ok(()),
            };
        };

        if !errors.is_empty() {
            let status = snapshot.status.get_or_insert_with(Default::default);
            set_status_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_DELETING,
                    ConditionStatus::False,
                    REASON_RESOURCE_ERROR,
                    &join_errors(&errors),
                ),
            );
        }

        let new_status = snapshot.status.unwrap_or_default();
        if let Err(e) = self.patcher.patch_status(&original, &new_status).await {
            errors.push(e);
        }

        if let Some(aggregate) = AggregateError::from_errors(errors) {
            return Err(aggregate.into());
        }
        if requeue {
            return Ok(());
        }

        if self
            .patcher
            .remove_finalizer(&original, CLUSTER_CLEANUP_FINALIZER)
            .await?
        {
            metrics::increment_finalizers_removed();
            info!("cleanup finished, removed cleanup finalizer");
        }
        Ok(())
    }
}
