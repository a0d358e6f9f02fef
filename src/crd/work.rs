//! # ManifestWork
//!
//! Work dispatched from the hub to a managed cluster. ManifestWorks live in
//! the cluster's namespace and are applied by the cluster's agent.

use crate::constants::WORK_CONDITION_COMPLETE;
use crate::crd::{find_condition, Condition, ConditionStatus};
use serde::{Deserialize, Serialize};

#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "ManifestWork",
    group = "work.open-cluster-management.io",
    version = "v1",
    namespaced,
    status = "ManifestWorkStatus",
    shortname = "mw"
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    /// Manifests the agent applies on the managed cluster
    #[serde(default)]
    pub workload: ManifestsTemplate,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestsTemplate {
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManifestWork {
    /// A completed dispatch has nothing left to do on the cluster
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| find_condition(&status.conditions, WORK_CONDITION_COMPLETE))
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
