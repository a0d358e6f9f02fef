//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Names of finalizers, condition types, and the RBAC objects created for a
//! managed cluster are part of the hub's contract with other components and
//! must not change.

/// Finalizer that defers removal of a ManagedCluster until cleanup finished
pub const CLUSTER_CLEANUP_FINALIZER: &str = "cluster.open-cluster-management.io/api-resource-cleanup";

/// Finalizer holding the work RoleBinding until all ManifestWorks are gone
pub const MANIFEST_WORK_CLEANUP_FINALIZER: &str =
    "cluster.open-cluster-management.io/manifest-work-cleanup";

/// Condition type reporting deletion progress on a ManagedCluster
pub const CONDITION_DELETING: &str = "ManagedClusterConditionDeleting";

/// Reason set when one or more cleanup calls failed
pub const REASON_RESOURCE_ERROR: &str = "DeletingResourceError";

/// Reason set while dependent resources are still present
pub const REASON_RESOURCE_REMAINING: &str = "ResourceRemaining";

/// Reason set once every dependent resource is gone
pub const REASON_RESOURCE_DELETED: &str = "ResourceDeleted";

/// Condition type marking a ManifestWork as finished
pub const WORK_CONDITION_COMPLETE: &str = "Complete";

/// Prefix shared by the cluster-scoped RBAC objects of a managed cluster
pub const CLUSTER_RBAC_PREFIX: &str = "open-cluster-management:managedcluster";

/// Prefix of the identity (group and agent users) of a managed cluster
pub const CLUSTER_IDENTITY_PREFIX: &str = "system:open-cluster-management";

/// Default fixed delay before re-delivering a cluster whose cleanup is incomplete
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 5;

/// Default number of read-modify-write attempts on optimistic-concurrency conflicts
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Default number of concurrent sync workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default interval for re-enqueuing every cached cluster (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;

/// Default minimum backoff after a failed sync (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Default maximum backoff after a failed sync (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Resource types collected from a cluster namespace when none are configured
pub const DEFAULT_GC_RESOURCE_LIST: &str = "addon.open-cluster-management.io/v1alpha1/managedclusteraddons,work.open-cluster-management.io/v1/manifestworks";
