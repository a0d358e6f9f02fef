//! # RBAC and Work Cleanup
//!
//! Revokes the hub access of a deleted cluster and removes the work still
//! addressed to it.
//!
//! A cluster's identity is the group `system:open-cluster-management:<name>`
//! plus every user `system:open-cluster-management:<name>:<agent>`. With
//! resource cleanup enabled every binding that references the identity is
//! removed, together with all RoleBindings in the cluster namespace. Without
//! it only the objects this controller created for the cluster are removed.
//!
//! The work RoleBinding carries a finalizer so agents can still report on
//! their ManifestWorks while those are being deleted. It is released once no
//! pending ManifestWork is left.

use crate::constants::{CLUSTER_IDENTITY_PREFIX, CLUSTER_RBAC_PREFIX, MANIFEST_WORK_CLEANUP_FINALIZER};
use crate::crd::ManagedCluster;
use crate::error::Error;
use crate::gc::{GcReconciler, ReconcileOutcome, ReconcileReport};
use crate::observability::metrics;
use crate::store::{ClusterAuthorizer, Deletion, RbacClient, WorkClient};
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::Subject;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the ClusterRole and ClusterRoleBinding created for a cluster
#[must_use]
pub fn cluster_role_name(cluster: &str) -> String {
    format!("{CLUSTER_RBAC_PREFIX}:{cluster}")
}

/// Name of the registration RoleBinding in the cluster namespace
#[must_use]
pub fn registration_role_binding_name(cluster: &str) -> String {
    format!("{CLUSTER_RBAC_PREFIX}:{cluster}:registration")
}

/// Name of the work RoleBinding in the cluster namespace
#[must_use]
pub fn work_role_binding_name(cluster: &str) -> String {
    format!("{CLUSTER_RBAC_PREFIX}:{cluster}:work")
}

/// Whether any subject is the cluster's group or one of its agent users
#[must_use]
pub fn references_cluster(subjects: Option<&[Subject]>, cluster: &str) -> bool {
    let group = format!("{CLUSTER_IDENTITY_PREFIX}:{cluster}");
    let user_prefix = format!("{group}:");
    subjects
        .unwrap_or_default()
        .iter()
        .any(|subject| match subject.kind.as_str() {
            "Group" => subject.name == group,
            "User" => subject.name.starts_with(&user_prefix),
            _ => false,
        })
}

/// Progress of one cleanup pass
#[derive(Default)]
struct Pass {
    /// Targeted objects that still exist
    remaining: usize,
    errors: Vec<Error>,
}

impl Pass {
    fn record(&mut self, kind: &str, name: &str, result: crate::error::Result<Deletion>) {
        match result {
            Ok(Deletion::Gone) => {
                metrics::increment_bindings_deleted(kind);
                debug!(kind, name = %name, "deleted");
            }
            Ok(Deletion::Terminating) => self.remaining += 1,
            Err(e) => {
                warn!(kind, name = %name, error = %e, "failed to delete");
                self.errors.push(e);
                self.remaining += 1;
            }
        }
    }

    fn into_report(self) -> ReconcileReport {
        let outcome = if self.remaining > 0 || !self.errors.is_empty() {
            ReconcileOutcome::Requeue
        } else {
            ReconcileOutcome::Continue
        };
        ReconcileReport::with_errors(outcome, self.errors)
    }
}

pub struct RbacGcReconciler {
    rbac: Arc<dyn RbacClient>,
    works: Arc<dyn WorkClient>,
    authorizer: Arc<dyn ClusterAuthorizer>,
    resource_cleanup_enabled: bool,
}

impl RbacGcReconciler {
    #[must_use]
    pub fn new(
        rbac: Arc<dyn RbacClient>,
        works: Arc<dyn WorkClient>,
        authorizer: Arc<dyn ClusterAuthorizer>,
        resource_cleanup_enabled: bool,
    ) -> Self {
        Self {
            rbac,
            works,
            authorizer,
            resource_cleanup_enabled,
        }
    }

    /// Remove only the objects created for the cluster by the hub
    async fn reconcile_legacy(&self, cluster_name: &str, namespace: &str) -> ReconcileReport {
        let mut pass = Pass::default();
        let role = cluster_role_name(cluster_name);
        let work_binding = work_role_binding_name(cluster_name);

        if let Err(e) = self
            .rbac
            .remove_role_binding_finalizer(namespace, &work_binding, MANIFEST_WORK_CLEANUP_FINALIZER)
            .await
        {
            pass.errors.push(e);
        }

        pass.record("ClusterRole", &role, self.rbac.delete_cluster_role(&role).await);
        pass.record(
            "ClusterRoleBinding",
            &role,
            self.rbac.delete_cluster_role_binding(&role).await,
        );
        for binding in [registration_role_binding_name(cluster_name), work_binding] {
            let result = self.rbac.delete_role_binding(namespace, &binding).await;
            pass.record("RoleBinding", &binding, result);
        }
        pass.into_report()
    }

    async fn delete_cluster_role_bindings(&self, cluster_name: &str, pass: &mut Pass) {
        let role = cluster_role_name(cluster_name);
        pass.record("ClusterRole", &role, self.rbac.delete_cluster_role(&role).await);

        let mut targets = BTreeSet::from([role]);
        match self.rbac.list_cluster_role_bindings().await {
            Ok(bindings) => {
                for binding in bindings {
                    if !references_cluster(binding.subjects.as_deref(), cluster_name) {
                        continue;
                    }
                    let Some(name) = binding.metadata.name else { continue };
                    if binding.metadata.deletion_timestamp.is_some() {
                        pass.remaining += 1;
                    } else {
                        targets.insert(name);
                    }
                }
            }
            Err(e) => pass.errors.push(e),
        }

        for name in targets {
            let result = self.rbac.delete_cluster_role_binding(&name).await;
            pass.record("ClusterRoleBinding", &name, result);
        }
    }

    /// Delete RoleBindings, returning whether the work RoleBinding still exists
    async fn delete_role_bindings(
        &self,
        cluster_name: &str,
        namespace: &str,
        pass: &mut Pass,
    ) -> bool {
        let work_binding = work_role_binding_name(cluster_name);
        let mut targets = BTreeSet::from([
            (namespace.to_string(), registration_role_binding_name(cluster_name)),
            (namespace.to_string(), work_binding.clone()),
        ]);

        let listings = [
            self.rbac.list_role_bindings(Some(namespace)).await.map(|b| (true, b)),
            self.rbac.list_role_bindings(None).await.map(|b| (false, b)),
        ];
        for listing in listings {
            let (in_cluster_namespace, bindings) = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    pass.errors.push(e);
                    continue;
                }
            };
            for binding in bindings {
                if !in_cluster_namespace
                    && !references_cluster(binding.subjects.as_deref(), cluster_name)
                {
                    continue;
                }
                let (Some(ns), Some(name)) = (binding.metadata.namespace, binding.metadata.name)
                else {
                    continue;
                };
                targets.insert((ns, name));
            }
        }

        let mut work_binding_exists = false;
        for (ns, name) in targets {
            let result = self.rbac.delete_role_binding(&ns, &name).await;
            if ns == namespace && name == work_binding {
                // Held by its finalizer until the ManifestWorks are gone
                match result {
                    Ok(Deletion::Gone) => metrics::increment_bindings_deleted("RoleBinding"),
                    Ok(Deletion::Terminating) => work_binding_exists = true,
                    Err(e) => {
                        pass.errors.push(e);
                        work_binding_exists = true;
                    }
                }
                continue;
            }
            pass.record("RoleBinding", &name, result);
        }
        work_binding_exists
    }

    /// Delete pending ManifestWorks of unauthorized clusters, returning how many remain
    async fn delete_pending_works(
        &self,
        cluster: Option<&ManagedCluster>,
        cluster_name: &str,
        namespace: &str,
        pass: &mut Pass,
    ) -> Option<usize> {
        let works = match self.works.list_works(namespace).await {
            Ok(works) => works,
            Err(e) => {
                pass.errors.push(e);
                return None;
            }
        };
        let pending: Vec<_> = works.into_iter().filter(|w| !w.is_completed()).collect();
        if pending.is_empty() {
            return Some(0);
        }

        let authorized = match cluster {
            None => false,
            Some(_) => match self.authorizer.is_authorized(cluster_name).await {
                Ok(authorized) => authorized,
                Err(e) => {
                    pass.errors.push(e);
                    return Some(pending.len());
                }
            },
        };
        if authorized {
            debug!(pending = pending.len(), "cluster still authorized, leaving ManifestWorks to the agent");
            return Some(pending.len());
        }

        let mut remaining = 0;
        for work in pending {
            let Some(name) = work.metadata.name.clone() else { continue };
            if work.is_deleting() {
                remaining += 1;
                continue;
            }
            match self.works.delete_work(namespace, &name).await {
                Ok(Deletion::Gone) => {
                    metrics::increment_works_deleted();
                    debug!(work = %name, "deleted pending ManifestWork");
                }
                Ok(Deletion::Terminating) => {
                    metrics::increment_works_deleted();
                    remaining += 1;
                }
                Err(e) => {
                    warn!(work = %name, error = %e, "failed to delete ManifestWork");
                    pass.errors.push(e);
                    remaining += 1;
                }
            }
        }
        Some(remaining)
    }
}

#[async_trait]
impl GcReconciler for RbacGcReconciler {
    fn name(&self) -> &'static str {
        "rbac"
    }

    async fn reconcile(
        &self,
        cluster: Option<&mut ManagedCluster>,
        cluster_namespace: &str,
    ) -> ReconcileReport {
        let cluster_name = cluster
            .as_ref()
            .and_then(|c| c.metadata.name.clone())
            .unwrap_or_else(|| cluster_namespace.to_string());

        if !self.resource_cleanup_enabled {
            return self
                .reconcile_legacy(&cluster_name, cluster_namespace)
                .await;
        }

        let mut pass = Pass::default();
        self.delete_cluster_role_bindings(&cluster_name, &mut pass)
            .await;
        let mut work_binding_exists = self
            .delete_role_bindings(&cluster_name, cluster_namespace, &mut pass)
            .await;

        let pending_works = self
            .delete_pending_works(cluster.as_deref(), &cluster_name, cluster_namespace, &mut pass)
            .await;
        match pending_works {
            Some(0) => {
                match self
                    .rbac
                    .remove_role_binding_finalizer(
                        cluster_namespace,
                        &work_role_binding_name(&cluster_name),
                        MANIFEST_WORK_CLEANUP_FINALIZER,
                    )
                    .await
                {
                    Ok(()) => work_binding_exists = false,
                    Err(e) => pass.errors.push(e),
                }
            }
            Some(remaining) => pass.remaining += remaining,
            None => {}
        }
        if work_binding_exists {
            pass.remaining += 1;
        }

        let report = pass.into_report();
        if report.outcome == ReconcileOutcome::Continue {
            info!(cluster = %cluster_name, "cluster RBAC and ManifestWorks cleaned up");
        }
        report
    }
}
