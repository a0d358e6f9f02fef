//! # ManagedCluster
//!
//! The fleet member record registered on the hub by a cluster's agent.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};

/// ManagedCluster Custom Resource Definition
///
/// Cluster scoped. The cluster's name is also the name of its dedicated
/// namespace on the hub.
///
/// # Example
///
/// ```yaml
/// apiVersion: cluster.open-cluster-management.io/v1
/// kind: ManagedCluster
/// metadata:
///   name: cluster-a
///   finalizers:
///     - cluster.open-cluster-management.io/api-resource-cleanup
/// spec:
///   hubAcceptsClient: true
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "ManagedCluster",
    group = "cluster.open-cluster-management.io",
    version = "v1",
    status = "ManagedClusterStatus",
    shortname = "mcl",
    printcolumn = r#"{"name":"Accepted", "type":"boolean", "jsonPath":".spec.hubAcceptsClient"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Whether the hub accepts the cluster's agent
    /// Only accepted clusters keep their RBAC while deletion is in progress
    #[serde(default)]
    pub hub_accepts_client: bool,
    /// Lease duration the agent renews (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
}

/// Status of a ManagedCluster
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedCluster {
    /// Whether the record carries a deletion timestamp
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == finalizer))
    }

    /// Conditions of the status, empty when no status was reported yet
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.conditions.as_slice())
    }
}
