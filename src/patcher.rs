//! # Update Helper
//!
//! Optimistic-concurrency read-modify-write for ManagedCluster records.
//!
//! The first attempt works on the caller's (possibly cached) copy. When the
//! API server rejects a write because the resourceVersion is stale, the
//! record is re-read from the store and the same mutation is applied to the
//! fresh copy. Writes that would not change anything are skipped.

use crate::crd::{
    find_condition, set_status_condition, Condition, ManagedCluster, ManagedClusterStatus,
};
use crate::error::{Error, Result};
use crate::store::ClusterStore;
use kube::ResourceExt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Run `operation` until it stops failing with a conflict
///
/// The closure receives the 1-based attempt number. After `attempts`
/// conflicting attempts the helper gives up with `Error::Conflict`.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match operation(attempt).await {
            Err(e) if e.is_conflict() => {
                debug!(cluster = %name, attempt, "write conflicted, retrying on latest version");
            }
            result => return result,
        }
    }
    Err(Error::Conflict {
        name: name.to_string(),
        attempts,
    })
}

/// Pending write computed from the current record
enum Write {
    Finalizers(Vec<String>),
    Status(ManagedClusterStatus),
}

/// Writes finalizers and status of ManagedClusters with conflict retry
#[derive(Clone)]
pub struct ClusterPatcher {
    store: Arc<dyn ClusterStore>,
    attempts: u32,
}

impl ClusterPatcher {
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>, attempts: u32) -> Self {
        Self { store, attempts }
    }

    /// Ensure the finalizer is present
    ///
    /// Returns true if a write was issued.
    pub async fn add_finalizer(&self, cluster: &ManagedCluster, finalizer: &str) -> Result<bool> {
        self.read_modify_write(cluster, |current| {
            if current.has_finalizer(finalizer) {
                return None;
            }
            let mut finalizers = current.finalizers().to_vec();
            finalizers.push(finalizer.to_string());
            Some(Write::Finalizers(finalizers))
        })
        .await
    }

    /// Ensure the finalizer is absent
    ///
    /// A record that disappeared meanwhile counts as done.
    pub async fn remove_finalizer(&self, cluster: &ManagedCluster, finalizer: &str) -> Result<bool> {
        self.read_modify_write(cluster, |current| {
            if !current.has_finalizer(finalizer) {
                return None;
            }
            let finalizers = current
                .finalizers()
                .iter()
                .filter(|f| *f != finalizer)
                .cloned()
                .collect();
            Some(Write::Finalizers(finalizers))
        })
        .await
    }

    /// Persist the conditions this pass changed onto the record
    ///
    /// No-op when `new_status` equals the status of `original`. Otherwise the
    /// conditions of `new_status` that differ from `original` are upserted by
    /// type into the latest status. Conditions the pass did not touch are
    /// taken from the latest record, so concurrent updates by other
    /// components survive a conflict retry.
    pub async fn patch_status(
        &self,
        original: &ManagedCluster,
        new_status: &ManagedClusterStatus,
    ) -> Result<bool> {
        let unchanged = match &original.status {
            Some(status) => status == new_status,
            None => *new_status == ManagedClusterStatus::default(),
        };
        if unchanged {
            return Ok(false);
        }

        let changed: Vec<Condition> = new_status
            .conditions
            .iter()
            .filter(|condition| {
                find_condition(original.conditions(), &condition.r#type) != Some(*condition)
            })
            .cloned()
            .collect();

        self.read_modify_write(original, |current| {
            let latest = current.status.clone().unwrap_or_default();
            let mut merged = latest.clone();
            for condition in &changed {
                set_status_condition(&mut merged.conditions, condition.clone());
            }
            (merged != latest).then_some(Write::Status(merged))
        })
        .await
    }

    async fn read_modify_write<F>(&self, original: &ManagedCluster, mutate: F) -> Result<bool>
    where
        F: Fn(&ManagedCluster) -> Option<Write>,
    {
        let name = original.name_any();
        let mutate = &mutate;
        retry_on_conflict(self.attempts, &name, |attempt| {
            let name = name.clone();
            async move {
                let current = if attempt == 1 {
                    original.clone()
                } else {
                    match self.store.get(&name).await? {
                        Some(latest) => latest,
                        None => {
                            debug!(cluster = %name, "cluster vanished while retrying write");
                            return Ok(false);
                        }
                    }
                };

                let Some(write) = mutate(&current) else {
                    return Ok(false);
                };
                let resource_version = current.metadata.resource_version.as_deref();
                let result = match write {
                    Write::Finalizers(finalizers) => {
                        self.store
                            .update_finalizers(&name, resource_version, &finalizers)
                            .await
                    }
                    Write::Status(status) => {
                        self.store
                            .update_status(&name, resource_version, &status)
                            .await
                    }
                };
                match result {
                    Ok(_) => Ok(true),
                    Err(Error::NotFound { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }
}
