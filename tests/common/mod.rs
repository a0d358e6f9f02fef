//! Common test utilities
//!
//! In-memory fakes of the store seams plus builders for test objects. Each
//! fake records the calls the behaviour tests assert on.

#![allow(dead_code, reason = "not every test binary uses every fake")]

use async_trait::async_trait;
use cluster_gc_controller::crd::{
    Condition, ManagedCluster, ManagedClusterStatus, ManifestWork,
};
use cluster_gc_controller::error::{Error, Result};
use cluster_gc_controller::gc::{GcReconciler, ReconcileOutcome, ReconcileReport, Requeuer, ResourceTypeDescriptor};
use cluster_gc_controller::store::{
    ClusterAuthorizer, ClusterCache, ClusterStore, Deletion, GcClients, MetadataClient, RbacClient,
    WorkClient,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DELETION_TIME: &str = "2024-01-01T00:00:00Z";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn api_error(code: u16, message: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code,
    })
}

pub fn server_error(message: &str) -> Error {
    Error::Kube(api_error(500, message))
}

pub fn deletion_time() -> Time {
    serde_json::from_value(json!(DELETION_TIME)).expect("valid timestamp")
}

/// A live cluster accepted by the hub
pub fn live_cluster(name: &str) -> ManagedCluster {
    serde_json::from_value(json!({
        "apiVersion": "cluster.open-cluster-management.io/v1",
        "kind": "ManagedCluster",
        "metadata": { "name": name, "resourceVersion": "1" },
        "spec": { "hubAcceptsClient": true },
    }))
    .expect("valid ManagedCluster")
}

/// A cluster marked for deletion, held by `finalizers`
pub fn deleting_cluster(name: &str, finalizers: &[&str]) -> ManagedCluster {
    serde_json::from_value(json!({
        "apiVersion": "cluster.open-cluster-management.io/v1",
        "kind": "ManagedCluster",
        "metadata": {
            "name": name,
            "resourceVersion": "1",
            "deletionTimestamp": DELETION_TIME,
            "finalizers": finalizers,
        },
        "spec": { "hubAcceptsClient": true },
    }))
    .expect("valid ManagedCluster")
}

pub fn object_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn terminating_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        deletion_timestamp: Some(deletion_time()),
        finalizers: Some(vec!["example.io/hold".to_string()]),
        ..object_meta(namespace, name)
    }
}

pub fn subject(kind: &str, name: &str) -> Subject {
    Subject {
        kind: kind.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn cluster_group(cluster: &str) -> Subject {
    subject("Group", &format!("system:open-cluster-management:{cluster}"))
}

pub fn cluster_agent(cluster: &str) -> Subject {
    subject(
        "User",
        &format!("system:open-cluster-management:{cluster}:agent"),
    )
}

pub fn cluster_role_binding(name: &str, subjects: Vec<Subject>) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: name.to_string(),
        },
        subjects: Some(subjects),
    }
}

pub fn role_binding(
    namespace: &str,
    name: &str,
    subjects: Vec<Subject>,
    finalizers: &[&str],
) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            finalizers: (!finalizers.is_empty())
                .then(|| finalizers.iter().map(|f| (*f).to_string()).collect()),
            ..object_meta(namespace, name)
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: name.to_string(),
        },
        subjects: Some(subjects),
    }
}

pub fn manifest_work(namespace: &str, name: &str, completed: bool) -> ManifestWork {
    let conditions = if completed {
        json!([{ "type": "Complete", "status": "True", "reason": "Done", "message": "" }])
    } else {
        json!([])
    };
    serde_json::from_value(json!({
        "apiVersion": "work.open-cluster-management.io/v1",
        "kind": "ManifestWork",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "workload": { "manifests": [] } },
        "status": { "conditions": conditions },
    }))
    .expect("valid ManifestWork")
}

pub fn deleting_condition(cluster: &ManagedCluster) -> Option<Condition> {
    cluster
        .conditions()
        .iter()
        .find(|c| c.r#type == "ManagedClusterConditionDeleting")
        .cloned()
}

// ---------------------------------------------------------------------------
// ClusterStore + ClusterCache
// ---------------------------------------------------------------------------

/// Authoritative store of ManagedClusters, doubling as the informer cache
///
/// Records a write only when the supplied resourceVersion matches; a deleting
/// record left without finalizers is erased, like the API server does.
#[derive(Default)]
pub struct FakeClusterStore {
    clusters: Mutex<HashMap<String, ManagedCluster>>,
    version: AtomicU32,
    conflicts: AtomicU32,
    gets: AtomicU32,
    finalizer_writes: AtomicU32,
    status_writes: AtomicU32,
}

impl FakeClusterStore {
    pub fn with_clusters(clusters: impl IntoIterator<Item = ManagedCluster>) -> Arc<Self> {
        let store = Arc::new(Self {
            version: AtomicU32::new(1),
            ..Default::default()
        });
        for cluster in clusters {
            store.insert(cluster);
        }
        store
    }

    pub fn insert(&self, cluster: ManagedCluster) {
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.name_any(), cluster);
    }

    pub fn cluster(&self, name: &str) -> Option<ManagedCluster> {
        self.clusters.lock().unwrap().get(name).cloned()
    }

    /// Reject the next `count` writes as stale, as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn finalizer_writes(&self) -> u32 {
        self.finalizer_writes.load(Ordering::SeqCst)
    }

    pub fn status_writes(&self) -> u32 {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn bump(&self, cluster: &mut ManagedCluster) {
        let next = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        cluster.metadata.resource_version = Some(next.to_string());
    }

    fn write(
        &self,
        name: &str,
        resource_version: Option<&str>,
        apply: impl FnOnce(&mut ManagedCluster),
    ) -> Result<ManagedCluster> {
        let mut clusters = self.clusters.lock().unwrap();
        let Some(current) = clusters.get_mut(name) else {
            return Err(Error::NotFound {
                kind: "ManagedCluster",
                name: name.to_string(),
            });
        };
        let stale = Error::StaleResourceVersion {
            kind: "ManagedCluster",
            name: name.to_string(),
        };
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.bump(current);
            return Err(stale);
        }
        if resource_version.is_some() && current.metadata.resource_version.as_deref() != resource_version {
            return Err(stale);
        }

        apply(current);
        self.bump(current);
        let written = current.clone();
        if written.is_deleting() && written.finalizers().is_empty() {
            clusters.remove(name);
        }
        Ok(written)
    }
}

#[async_trait]
impl ClusterStore for FakeClusterStore {
    async fn get(&self, name: &str) -> Result<Option<ManagedCluster>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.cluster(name))
    }

    async fn update_finalizers(
        &self,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<ManagedCluster> {
        let result = self.write(name, resource_version, |cluster| {
            cluster.metadata.finalizers = Some(finalizers.to_vec());
        });
        if result.is_ok() {
            self.finalizer_writes.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn update_status(
        &self,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterStatus,
    ) -> Result<ManagedCluster> {
        let result = self.write(name, resource_version, |cluster| {
            cluster.status = Some(status.clone());
        });
        if result.is_ok() {
            self.status_writes.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

impl ClusterCache for FakeClusterStore {
    fn get(&self, name: &str) -> Option<Arc<ManagedCluster>> {
        self.cluster(name).map(Arc::new)
    }
}

// ---------------------------------------------------------------------------
// MetadataClient
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMetadataClient {
    namespaces: Mutex<HashSet<String>>,
    objects: Mutex<BTreeMap<(String, String), Vec<ObjectMeta>>>,
    failing_lists: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    held_by_finalizers: Mutex<HashSet<String>>,
    lists: Mutex<Vec<String>>,
    deletes: Mutex<Vec<(String, String)>>,
}

impl FakeMetadataClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.namespaces.lock().unwrap().insert(namespace.to_string());
    }

    pub fn add_object(&self, descriptor: &ResourceTypeDescriptor, meta: ObjectMeta) {
        let namespace = meta.namespace.clone().unwrap_or_default();
        self.objects
            .lock()
            .unwrap()
            .entry((descriptor.to_string(), namespace))
            .or_default()
            .push(meta);
    }

    pub fn objects(&self, descriptor: &ResourceTypeDescriptor, namespace: &str) -> Vec<ObjectMeta> {
        self.objects
            .lock()
            .unwrap()
            .get(&(descriptor.to_string(), namespace.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Fail every list of the given resource type
    pub fn fail_lists_of(&self, resource: &str) {
        self.failing_lists.lock().unwrap().insert(resource.to_string());
    }

    /// Fail every delete of the given resource type
    pub fn fail_deletes_of(&self, resource: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(resource.to_string());
    }

    /// Deleted objects of this type stay around, terminating
    pub fn hold_with_finalizers(&self, resource: &str) {
        self.held_by_finalizers
            .lock()
            .unwrap()
            .insert(resource.to_string());
    }

    pub fn lists(&self) -> Vec<String> {
        self.lists.lock().unwrap().clone()
    }

    /// `(resource, name)` of every delete issued
    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataClient for FakeMetadataClient {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.lock().unwrap().contains(namespace))
    }

    async fn list(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
    ) -> Result<Vec<ObjectMeta>> {
        self.lists.lock().unwrap().push(descriptor.resource.clone());
        if self.failing_lists.lock().unwrap().contains(&descriptor.resource) {
            return Err(server_error(&format!("list {} failed", descriptor.resource)));
        }
        Ok(self.objects(descriptor, namespace))
    }

    async fn delete(
        &self,
        descriptor: &ResourceTypeDescriptor,
        namespace: &str,
        name: &str,
    ) -> Result<Deletion> {
        self.deletes
            .lock()
            .unwrap()
            .push((descriptor.resource.clone(), name.to_string()));
        if self
            .failing_deletes
            .lock()
            .unwrap()
            .contains(&descriptor.resource)
        {
            return Err(server_error(&format!("delete {name} failed")));
        }

        let held = self
            .held_by_finalizers
            .lock()
            .unwrap()
            .contains(&descriptor.resource);
        let mut objects = self.objects.lock().unwrap();
        let Some(items) = objects.get_mut(&(descriptor.to_string(), namespace.to_string())) else {
            return Ok(Deletion::Gone);
        };
        let Some(position) = items.iter().position(|m| m.name.as_deref() == Some(name)) else {
            return Ok(Deletion::Gone);
        };
        if held {
            items[position].deletion_timestamp = Some(deletion_time());
            Ok(Deletion::Terminating)
        } else {
            items.remove(position);
            Ok(Deletion::Gone)
        }
    }
}

// ---------------------------------------------------------------------------
// RbacClient
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRbacClient {
    cluster_roles: Mutex<BTreeSet<String>>,
    cluster_role_bindings: Mutex<BTreeMap<String, ClusterRoleBinding>>,
    role_bindings: Mutex<BTreeMap<(String, String), RoleBinding>>,
    fail_lists: Mutex<bool>,
    role_binding_lists: AtomicU32,
}

impl FakeRbacClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_cluster_role(&self, name: &str) {
        self.cluster_roles.lock().unwrap().insert(name.to_string());
    }

    pub fn add_cluster_role_binding(&self, binding: ClusterRoleBinding) {
        self.cluster_role_bindings
            .lock()
            .unwrap()
            .insert(binding.name_any(), binding);
    }

    pub fn add_role_binding(&self, binding: RoleBinding) {
        let key = (binding.namespace().unwrap_or_default(), binding.name_any());
        self.role_bindings.lock().unwrap().insert(key, binding);
    }

    pub fn fail_lists(&self) {
        *self.fail_lists.lock().unwrap() = true;
    }

    pub fn has_cluster_role(&self, name: &str) -> bool {
        self.cluster_roles.lock().unwrap().contains(name)
    }

    pub fn has_cluster_role_binding(&self, name: &str) -> bool {
        self.cluster_role_bindings.lock().unwrap().contains_key(name)
    }

    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.role_bindings
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn role_binding_lists(&self) -> u32 {
        self.role_binding_lists.load(Ordering::SeqCst)
    }

    fn check_lists(&self) -> Result<()> {
        if *self.fail_lists.lock().unwrap() {
            return Err(server_error("list failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl RbacClient for FakeRbacClient {
    async fn list_cluster_role_bindings(&self) -> Result<Vec<ClusterRoleBinding>> {
        self.check_lists()?;
        Ok(self
            .cluster_role_bindings
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect())
    }

    async fn list_role_bindings(&self, namespace: Option<&str>) -> Result<Vec<RoleBinding>> {
        self.role_binding_lists.fetch_add(1, Ordering::SeqCst);
        self.check_lists()?;
        Ok(self
            .role_bindings
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, binding)| binding.clone())
            .collect())
    }

    async fn delete_cluster_role(&self, name: &str) -> Result<Deletion> {
        self.cluster_roles.lock().unwrap().remove(name);
        Ok(Deletion::Gone)
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<Deletion> {
        self.cluster_role_bindings.lock().unwrap().remove(name);
        Ok(Deletion::Gone)
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> Result<Deletion> {
        let mut bindings = self.role_bindings.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let Some(binding) = bindings.get_mut(&key) else {
            return Ok(Deletion::Gone);
        };
        if binding.finalizers().is_empty() {
            bindings.remove(&key);
            return Ok(Deletion::Gone);
        }
        binding.metadata.deletion_timestamp = Some(deletion_time());
        Ok(Deletion::Terminating)
    }

    async fn remove_role_binding_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<()> {
        let mut bindings = self.role_bindings.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let Some(binding) = bindings.get_mut(&key) else {
            return Ok(());
        };
        binding.finalizers_mut().retain(|f| f != finalizer);
        if binding.metadata.deletion_timestamp.is_some() && binding.finalizers().is_empty() {
            bindings.remove(&key);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WorkClient
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeWorkClient {
    works: Mutex<BTreeMap<(String, String), ManifestWork>>,
    held_by_finalizers: Mutex<bool>,
    lists: AtomicU32,
    deletes: Mutex<Vec<String>>,
}

impl FakeWorkClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_work(&self, work: ManifestWork) {
        let key = (work.namespace().unwrap_or_default(), work.name_any());
        self.works.lock().unwrap().insert(key, work);
    }

    pub fn remove_work(&self, namespace: &str, name: &str) {
        self.works
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Deleted works stay around, terminating
    pub fn hold_with_finalizers(&self) {
        *self.held_by_finalizers.lock().unwrap() = true;
    }

    pub fn work_names(&self) -> Vec<String> {
        self.works
            .lock()
            .unwrap()
            .keys()
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn lists(&self) -> u32 {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkClient for FakeWorkClient {
    async fn list_works(&self, namespace: &str) -> Result<Vec<ManifestWork>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .works
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, work)| work.clone())
            .collect())
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<Deletion> {
        self.deletes.lock().unwrap().push(name.to_string());
        let held = *self.held_by_finalizers.lock().unwrap();
        let mut works = self.works.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let Some(work) = works.get_mut(&key) else {
            return Ok(Deletion::Gone);
        };
        if held {
            work.metadata.deletion_timestamp = Some(deletion_time());
            return Ok(Deletion::Terminating);
        }
        works.remove(&key);
        Ok(Deletion::Gone)
    }
}

// ---------------------------------------------------------------------------
// ClusterAuthorizer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAuthorizer {
    authorized: Mutex<bool>,
    calls: AtomicU32,
}

impl FakeAuthorizer {
    pub fn new(authorized: bool) -> Arc<Self> {
        Arc::new(Self {
            authorized: Mutex::new(authorized),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterAuthorizer for FakeAuthorizer {
    async fn is_authorized(&self, _cluster_name: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.authorized.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Queue and scripted reconcilers
// ---------------------------------------------------------------------------

/// Records every delayed re-delivery
#[derive(Default)]
pub struct RecordingQueue {
    requeues: Mutex<Vec<(String, Duration)>>,
}

impl RecordingQueue {
    pub fn requeues(&self) -> Vec<(String, Duration)> {
        self.requeues.lock().unwrap().clone()
    }
}

impl Requeuer for RecordingQueue {
    fn add_after(&self, key: &str, delay: Duration) {
        self.requeues
            .lock()
            .unwrap()
            .push((key.to_string(), delay));
    }
}

/// Reconciler returning a fixed outcome and fixed error messages
pub struct ScriptedReconciler {
    name: &'static str,
    outcome: ReconcileOutcome,
    errors: Vec<String>,
    calls: Arc<AtomicU32>,
    saw_cluster: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedReconciler {
    pub fn new(name: &'static str, outcome: ReconcileOutcome, errors: &[&str]) -> Self {
        Self {
            name,
            outcome,
            errors: errors.iter().map(|e| (*e).to_string()).collect(),
            calls: Arc::new(AtomicU32::new(0)),
            saw_cluster: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared call counter, readable after the reconciler moved into the controller
    pub fn calls(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    /// Whether each call received a cluster snapshot
    pub fn saw_cluster(&self) -> Arc<Mutex<Vec<bool>>> {
        self.saw_cluster.clone()
    }
}

#[async_trait]
impl GcReconciler for ScriptedReconciler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn reconcile(
        &self,
        cluster: Option<&mut ManagedCluster>,
        _cluster_namespace: &str,
    ) -> ReconcileReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.saw_cluster.lock().unwrap().push(cluster.is_some());
        let errors = self
            .errors
            .iter()
            .map(|message| server_error(message))
            .collect();
        ReconcileReport::with_errors(self.outcome, errors)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// All fakes behind one `GcClients`
pub struct Fakes {
    pub store: Arc<FakeClusterStore>,
    pub metadata: Arc<FakeMetadataClient>,
    pub rbac: Arc<FakeRbacClient>,
    pub works: Arc<FakeWorkClient>,
    pub authorizer: Arc<FakeAuthorizer>,
}

impl Fakes {
    pub fn new(clusters: impl IntoIterator<Item = ManagedCluster>) -> Self {
        Self {
            store: FakeClusterStore::with_clusters(clusters),
            metadata: FakeMetadataClient::new(),
            rbac: FakeRbacClient::new(),
            works: FakeWorkClient::new(),
            authorizer: FakeAuthorizer::new(true),
        }
    }

    pub fn clients(&self) -> GcClients {
        GcClients {
            cache: self.store.clone(),
            store: self.store.clone(),
            metadata: self.metadata.clone(),
            rbac: self.rbac.clone(),
            works: self.works.clone(),
            authorizer: self.authorizer.clone(),
        }
    }
}
