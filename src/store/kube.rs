//! # Kubernetes-backed Store
//!
//! Implementations of the store seams against the hub API server.
//!
//! Writes to ManagedClusters are JSON merge patches that include
//! `metadata.resourceVersion`, so the API server rejects them with 409 when
//! the record changed since it was read.

use crate::crd::{ManagedCluster, ManagedClusterStatus, ManifestWork};
use crate::error::{is_conflict, is_not_found, Error, Result};
use crate::gc::ResourceTypeDescriptor;
use crate::store::{
    ClusterAuthorizer, ClusterCache, ClusterStore, Deletion, GcClients, MetadataClient, RbacClient,
    WorkClient,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube_runtime::reflector::{ObjectRef, Store};
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Build the production client bundle around a shared client and the informer cache
#[must_use]
pub fn clients(client: Client, cache: Store<ManagedCluster>) -> GcClients {
    GcClients {
        cache: Arc::new(cache),
        store: Arc::new(KubeClusterStore::new(client.clone())),
        metadata: Arc::new(KubeMetadataClient::new(client.clone())),
        rbac: Arc::new(KubeRbacClient::new(client.clone())),
        works: Arc::new(KubeWorkClient::new(client.clone())),
        authorizer: Arc::new(KubeClusterAuthorizer::new(client)),
    }
}

impl ClusterCache for Store<ManagedCluster> {
    fn get(&self, name: &str) -> Option<Arc<ManagedCluster>> {
        Store::get(self, &ObjectRef::new(name))
    }
}

/// Map a failed ManagedCluster write onto the dedicated error variants
fn map_write_error(error: kube::Error, name: &str) -> Error {
    if is_conflict(&error) {
        Error::StaleResourceVersion {
            kind: "ManagedCluster",
            name: name.to_string(),
        }
    } else if is_not_found(&error) {
        Error::NotFound {
            kind: "ManagedCluster",
            name: name.to_string(),
        }
    } else {
        Error::Kube(error)
    }
}

/// Issue a delete and classify the outcome
///
/// `Left` means the API server returned the object, which is still present
/// behind finalizers; `Right` means it is gone.
async fn delete_object<K>(api: &Api<K>, name: &str, params: &DeleteParams) -> Result<Deletion>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, params).await {
        Ok(response) if response.is_left() => Ok(Deletion::Terminating),
        Ok(_) => Ok(Deletion::Gone),
        Err(e) if is_not_found(&e) => {
            debug!(name = %name, "object already deleted");
            Ok(Deletion::Gone)
        }
        Err(e) => Err(e.into()),
    }
}

pub struct KubeClusterStore {
    api: Api<ManagedCluster>,
}

impl KubeClusterStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, name: &str) -> Result<Option<ManagedCluster>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn update_finalizers(
        &self,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<ManagedCluster> {
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
                "finalizers": finalizers,
            }
        });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, name))
    }

    async fn update_status(
        &self,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterStatus,
    ) -> Result<ManagedCluster> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        self.api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, name))
    }
}

pub struct KubeMetadataClient {
    client: Client,
}

impl KubeMetadataClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, descriptor: &ResourceTypeDescriptor, namespace: &str) -> Api<DynamicObject> {
        // Only the plural is used to build request paths, the kind stays empty
        let gvk = GroupVersionKind::gvk(&descriptor.group, &descriptor.version, "");
        let resource = ApiResource::from_gvk_with_plural(&gvk, &descriptor.resource);
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

#[async_trait]
impl MetadataClient for KubeMetadataClient {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.is_some())
    }

    async fn list(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
    ) -> Result<Vec<ObjectMeta>> {
        match self
            .api(descriptor, namespace)
            .list_metadata(&ListParams::default())
            .await
        {
            Ok(list) => Ok(list.items.into_iter().map(|item| item.metadata).collect()),
            Err(e) if is_not_found(&e) => {
                debug!(resource = %descriptor, "resource type not served");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
        name: &str,
    ) -> Result<Deletion> {
        delete_object(
            &self.api(descriptor, namespace),
            name,
            &DeleteParams::foreground(),
        )
        .await
    }
}

pub struct KubeRbacClient {
    client: Client,
}

impl KubeRbacClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RbacClient for KubeRbacClient {
    async fn list_cluster_role_bindings(&self) -> Result<Vec<ClusterRoleBinding>> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_role_bindings(&self, namespace: Option<&str>) -> Result<Vec<RoleBinding>> {
        let api: Api<RoleBinding> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn delete_cluster_role(&self, name: &str) -> Result<Deletion> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        delete_object(&api, name, &DeleteParams::default()).await
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<Deletion> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        delete_object(&api, name, &DeleteParams::default()).await
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<Deletion> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        delete_object(&api, name, &DeleteParams::default()).await
    }

    async fn remove_role_binding_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<()> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        let Some(binding) = api.get_opt(name).await? else {
            return Ok(());
        };
        let current = binding.metadata.finalizers.unwrap_or_default();
        if !current.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let remaining: Vec<String> = current.into_iter().filter(|f| f != finalizer).collect();
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": binding.metadata.resource_version,
                "finalizers": remaining,
            }
        });
        match api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct KubeWorkClient {
    client: Client,
}

impl KubeWorkClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkClient for KubeWorkClient {
    async fn list_works(&self, namespace: &str) -> Result<Vec<ManifestWork>> {
        let api: Api<ManifestWork> = Api::namespaced(self.client.clone(), namespace);
        match api.list(&ListParams::default()).await {
            Ok(list) => Ok(list.items),
            Err(e) if is_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<Deletion> {
        let api: Api<ManifestWork> = Api::namespaced(self.client.clone(), namespace);
        delete_object(&api, name, &DeleteParams::background()).await
    }
}

/// Authorizes an agent while its ManagedCluster exists and is accepted by the hub
pub struct KubeClusterAuthorizer {
    api: Api<ManagedCluster>,
}

impl KubeClusterAuthorizer {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ClusterAuthorizer for KubeClusterAuthorizer {
    async fn is_authorized(&self, cluster_name: &str) -> Result<bool> {
        Ok(self
            .api
            .get_opt(cluster_name)
            .await?
            .is_some_and(|cluster| cluster.spec.hub_accepts_client))
    }
}
