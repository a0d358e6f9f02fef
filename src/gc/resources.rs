//! # Resource-Type GC
//!
//! Deletes the dependent resources of a deleted cluster from its namespace,
//! one configured resource type at a time, using metadata-only requests.

use crate::constants::{CONDITION_DELETING, REASON_RESOURCE_DELETED, REASON_RESOURCE_REMAINING};
use crate::crd::{set_status_condition, Condition, ConditionStatus, ManagedCluster};
use crate::error::Error;
use crate::gc::{GcReconciler, ReconcileOutcome, ReconcileReport};
use crate::observability::metrics;
use crate::store::{Deletion, MetadataClient};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A resource type addressed as `group/version/resource`
///
/// The core group is the empty string, written `/v1/configmaps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceTypeDescriptor {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ResourceTypeDescriptor {
    #[must_use]
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl FromStr for ResourceTypeDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split('/').collect::<Vec<_>>().as_slice() {
            [group, version, resource] if !version.is_empty() && !resource.is_empty() => {
                Ok(Self::new(group, version, resource))
            }
            _ => Err(Error::InvalidDescriptor(s.to_string())),
        }
    }
}

impl fmt::Display for ResourceTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// Parse configured descriptors, logging and skipping malformed entries
pub fn parse_descriptors<'a, I>(entries: I) -> Vec<ResourceTypeDescriptor>
where
    I: IntoIterator<Item = &'a str>,
{
    entries
        .into_iter()
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(error = %e, "skipping gc resource entry");
                None
            }
        })
        .collect()
}

/// Objects of one type still present in the cluster namespace
struct Remaining {
    resource: String,
    count: usize,
}

pub struct ResourceGcReconciler {
    metadata: Arc<dyn MetadataClient>,
    resources: Arc<[ResourceTypeDescriptor]>,
}

impl ResourceGcReconciler {
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataClient>, resources: Arc<[ResourceTypeDescriptor]>) -> Self {
        Self {
            metadata,
            resources,
        }
    }

    /// Delete every object of one type, returning how many are left behind
    async fn collect_type(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
        errors: &mut Vec<Error>,
    ) -> usize {
        let items = match self.metadata.list(descriptor, namespace).await {
            Ok(items) => items,
            Err(e) => {
                warn!(resource = %descriptor, error = %e, "failed to list resources");
                errors.push(e);
                return 0;
            }
        };

        let mut remaining = 0;
        for item in items {
            let Some(name) = item.name else { continue };
            if item.deletion_timestamp.is_some() {
                // Already deleting, waiting on its own finalizers
                remaining += 1;
                continue;
            }
            match self.metadata.delete(descriptor, namespace, &name).await {
                Ok(Deletion::Gone) => {
                    metrics::increment_resources_deleted(&descriptor.resource);
                    debug!(resource = %descriptor, name = %name, "deleted resource");
                }
                Ok(Deletion::Terminating) => {
                    metrics::increment_resources_deleted(&descriptor.resource);
                    remaining += 1;
                }
                Err(e) => {
                    warn!(resource = %descriptor, name = %name, error = %e, "failed to delete resource");
                    errors.push(e);
                    remaining += 1;
                }
            }
        }
        remaining
    }
}

fn deleting_condition(remaining: &[Remaining]) -> Condition {
    if remaining.is_empty() {
        return Condition::new(
            CONDITION_DELETING,
            ConditionStatus::True,
            REASON_RESOURCE_DELETED,
            "All dependent resources are deleted",
        );
    }
    let detail: Vec<String> = remaining
        .iter()
        .map(|r| format!("{} {}", r.count, r.resource))
        .collect();
    Condition::new(
        CONDITION_DELETING,
        ConditionStatus::False,
        REASON_RESOURCE_REMAINING,
        &format!("Dependent resources remaining: {}", detail.join(", ")),
    )
}

#[async_trait]
impl GcReconciler for ResourceGcReconciler {
    fn name(&self) -> &'static str {
        "resources"
    }

    async fn reconcile(
        &self,
        cluster: Option<&mut ManagedCluster>,
        cluster_namespace: &str,
    ) -> ReconcileReport {
        match self.metadata.namespace_exists(cluster_namespace).await {
            Ok(true) => {}
            Ok(false) => return ReconcileReport::new(ReconcileOutcome::Continue),
            Err(e) => {
                return ReconcileReport::with_errors(ReconcileOutcome::Requeue, vec![e]);
            }
        }

        let mut errors = Vec::new();
        let mut remaining = Vec::new();
        for descriptor in self.resources.iter() {
            let count = self
                .collect_type(descriptor, cluster_namespace, &mut errors)
                .await;
            if count > 0 {
                remaining.push(Remaining {
                    resource: descriptor.resource.clone(),
                    count,
                });
            }
        }

        if let Some(cluster) = cluster {
            let status = cluster.status.get_or_insert_with(Default::default);
            set_status_condition(&mut status.conditions, deleting_condition(&remaining));
        }

        if remaining.is_empty() && errors.is_empty() {
            info!(namespace = %cluster_namespace, "all dependent resources deleted");
            ReconcileReport::new(ReconcileOutcome::Continue)
        } else {
            ReconcileReport::with_errors(ReconcileOutcome::Requeue, errors)
        }
    }
}
