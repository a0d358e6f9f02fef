//! # Reconcile
//!
//! Bridges the controller runtime and `GcController::sync`. A requeue asked
//! for during the pass becomes `Action::requeue`; a clean pass waits for the
//! next change or resync.

use crate::crd::ManagedCluster;
use crate::error::Result;
use crate::gc::{GcController, Requeuer};
use crate::runtime::error_policy::ErrorPolicy;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared state handed to every reconcile and error-policy call
#[derive(Debug)]
pub struct Context {
    pub gc: Arc<GcController>,
    pub policy: Arc<ErrorPolicy>,
}

/// Captures the re-delivery requested by one sync pass
#[derive(Debug, Default)]
pub struct RequeueSlot {
    delay: Mutex<Option<Duration>>,
}

impl RequeueSlot {
    /// The shortest delay requested, if any
    pub fn take(&self) -> Option<Duration> {
        self.delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Requeuer for RequeueSlot {
    fn add_after(&self, _key: &str, delay: Duration) {
        let mut slot = self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(slot.map_or(delay, |current| current.min(delay)));
    }
}

/// Sync one cached cluster
///
/// Errors are handed to `handle_sync_error`, which schedules the backoff.
pub async fn reconcile(cluster: Arc<ManagedCluster>, ctx: Arc<Context>) -> Result<Action> {
    let name = cluster.name_any();
    let slot = RequeueSlot::default();
    ctx.gc.sync(&name, &slot).await?;
    ctx.policy.forget(&name);
    Ok(slot.take().map_or_else(Action::await_change, Action::requeue))
}
