//! # Store Seams
//!
//! Traits the GC logic uses to reach the hub API server. The production
//! implementations live in `kube.rs`; behaviour tests substitute in-memory
//! fakes.
//!
//! Every delete treats "not found" as success and reports whether the object
//! is already gone or still terminating behind finalizers.

pub mod kube;

use crate::crd::{ManagedCluster, ManagedClusterStatus, ManifestWork};
use crate::error::Result;
use crate::gc::ResourceTypeDescriptor;
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The object no longer exists
    Gone,
    /// The delete was accepted but finalizers keep the object around
    Terminating,
}

/// Read-only view of the informer cache of ManagedClusters
pub trait ClusterCache: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<ManagedCluster>>;
}

/// Authoritative access to ManagedCluster records
///
/// Writes carry the caller's last observed resourceVersion; a stale version
/// is rejected with `Error::StaleResourceVersion` and a missing object with
/// `Error::NotFound`.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch the current record, bypassing the cache
    async fn get(&self, name: &str) -> Result<Option<ManagedCluster>>;

    /// Replace the finalizer list
    async fn update_finalizers(
        &self,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<ManagedCluster>;

    /// Replace the status subresource
    async fn update_status(
        &self,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterStatus,
    ) -> Result<ManagedCluster>;
}

/// Untyped access to arbitrary resource types, metadata only
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// List the objects of one type in a namespace
    ///
    /// A type the API server no longer serves yields an empty list.
    async fn list(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
    ) -> Result<Vec<ObjectMeta>>;

    /// Delete one object with foreground propagation
    async fn delete(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
        name: &str,
    ) -> Result<Deletion>;
}

/// Access to the RBAC objects bound to a cluster's identity
#[async_trait]
pub trait RbacClient: Send + Sync {
    async fn list_cluster_role_bindings(&self) -> Result<Vec<ClusterRoleBinding>>;

    /// List RoleBindings in one namespace, or in all namespaces when `None`
    async fn list_role_bindings(&self, namespace: Option<&str>) -> Result<Vec<RoleBinding>>;

    async fn delete_cluster_role(&self, name: &str) -> Result<Deletion>;

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<Deletion>;

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<Deletion>;

    /// Strip a finalizer from a RoleBinding; absent binding or finalizer is a no-op
    async fn remove_role_binding_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<()>;
}

/// Access to the ManifestWorks in a cluster namespace
#[async_trait]
pub trait WorkClient: Send + Sync {
    async fn list_works(&self, namespace: &str) -> Result<Vec<ManifestWork>>;

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<Deletion>;
}

/// Decides whether a cluster's agent may still act on the hub
#[async_trait]
pub trait ClusterAuthorizer: Send + Sync {
    async fn is_authorized(&self, cluster_name: &str) -> Result<bool>;
}

/// Bundle of clients handed to the controller at construction
#[derive(Clone)]
pub struct GcClients {
    pub cache: Arc<dyn ClusterCache>,
    pub store: Arc<dyn ClusterStore>,
    pub metadata: Arc<dyn MetadataClient>,
    pub rbac: Arc<dyn RbacClient>,
    pub works: Arc<dyn WorkClient>,
    pub authorizer: Arc<dyn ClusterAuthorizer>,
}
