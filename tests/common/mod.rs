//! Common test utilities for replication tests
//!
//! Provides an in-memory cluster implementing the engine's client traits,
//! plus builders for sources, namespaces and configuration.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, NamespaceStatus, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use namespace_replicator::config::ReplicatorConfig;
use namespace_replicator::constants::{
    DESIRED_NAMESPACES_ANNOTATION, NAMESPACE_PHASE_ACTIVE, NAMESPACE_PHASE_TERMINATING,
    REPLICATION_ALLOWED_ANNOTATION,
};
use namespace_replicator::controller::client::{
    DeleteOutcome, NamespaceClient, ObjectClient, Replicable,
};
use namespace_replicator::controller::reconciler::{
    ReconcileOutcome, Reconciler, ReconcilerError,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct ClusterState<K> {
    objects: BTreeMap<(String, String), K>,
    namespaces: BTreeMap<String, Namespace>,
    next_version: u64,
    conflicts_pending: u32,
    vanish_next_replace: bool,
    fail_creates_in: Vec<String>,
    vanished_namespaces: Vec<String>,
    writes: Vec<String>,
}

/// In-memory API server for one kind plus namespaces
///
/// Mirrors the API server behaviour the engine relies on: resource versions
/// bump on every write, stale replaces conflict, and deleting an object that
/// carries finalizers only stamps a deletion timestamp.
#[derive(Debug)]
pub struct FakeCluster<K> {
    state: Mutex<ClusterState<K>>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
        .expect("valid RFC 3339 timestamp")
}

impl<K: Replicable> FakeCluster<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState {
                objects: BTreeMap::new(),
                namespaces: BTreeMap::new(),
                next_version: 1,
                conflicts_pending: 0,
                vanish_next_replace: false,
                fail_creates_in: Vec::new(),
                vanished_namespaces: Vec::new(),
                writes: Vec::new(),
            }),
        }
    }

    /// Cluster with one active namespace per name
    pub fn with_namespaces(names: &[&str]) -> Self {
        let cluster = Self::new();
        for name in names {
            cluster.add_namespace(name, NAMESPACE_PHASE_ACTIVE);
        }
        cluster
    }

    pub fn add_namespace(&self, name: &str, phase: &str) {
        let mut state = self.state.lock().expect("cluster lock");
        state.namespaces.insert(name.to_string(), namespace(name, phase));
    }

    pub fn terminate_namespace(&self, name: &str) {
        self.add_namespace(name, NAMESPACE_PHASE_TERMINATING);
    }

    /// Store an object the way `kubectl apply` would, bumping its version
    pub fn put(&self, object: K) -> K {
        let mut state = self.state.lock().expect("cluster lock");
        let mut object = object;
        let version = state.next_version;
        state.next_version += 1;
        object.meta_mut().resource_version = Some(version.to_string());
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        state.objects.insert(key(&namespace, &name), object.clone());
        object
    }

    /// Mutate a stored object in place, as another client would
    pub fn edit<F: FnOnce(&mut K)>(&self, namespace: &str, name: &str, f: F) {
        let mut object = self.object(namespace, name).expect("object to edit exists");
        f(&mut object);
        self.put(object);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock().expect("cluster lock");
        state.objects.get(&key(namespace, name)).cloned()
    }

    /// Namespaces holding an object called `name`, sorted
    pub fn namespaces_holding(&self, name: &str) -> Vec<String> {
        let state = self.state.lock().expect("cluster lock");
        state
            .objects
            .keys()
            .filter(|(_, n)| n == name)
            .map(|(ns, _)| ns.clone())
            .collect()
    }

    /// Fail the next `count` replace calls with a conflict
    pub fn conflict_next_replaces(&self, count: u32) {
        self.state.lock().expect("cluster lock").conflicts_pending = count;
    }

    /// The next replace finds its object deleted by another client
    pub fn vanish_next_replace(&self) {
        self.state.lock().expect("cluster lock").vanish_next_replace = true;
    }

    pub fn fail_creates_in(&self, namespace: &str) {
        self.state
            .lock()
            .expect("cluster lock")
            .fail_creates_in
            .push(namespace.to_string());
    }

    /// Stop failing creates in `namespace`
    pub fn allow_creates_in(&self, namespace: &str) {
        self.state
            .lock()
            .expect("cluster lock")
            .fail_creates_in
            .retain(|ns| ns != namespace);
    }

    /// Creates in `namespace` fail with `NotFound`, as if it was deleted after
    /// target resolution
    pub fn vanish_namespace_on_create(&self, namespace: &str) {
        self.state
            .lock()
            .expect("cluster lock")
            .vanished_namespaces
            .push(namespace.to_string());
    }

    /// Writes issued through the client traits, as `verb ns/name`
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().expect("cluster lock").writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().expect("cluster lock").writes.clear();
    }

    /// Delete an object; finalizers turn this into a deletion timestamp
    pub fn remove(&self, namespace: &str, name: &str) -> DeleteOutcome {
        let mut state = self.state.lock().expect("cluster lock");
        let Some(stored) = state.objects.get(&key(namespace, name)).cloned() else {
            return DeleteOutcome::AlreadyGone;
        };
        state.writes.push(format!("delete {namespace}/{name}"));
        if stored.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            drop(state);
            let mut stored = stored;
            stored.meta_mut().deletion_timestamp = Some(deletion_time());
            self.put(stored);
        } else {
            state.objects.remove(&key(namespace, name));
        }
        DeleteOutcome::Deleted
    }

    fn conflict(namespace: &str, name: &str) -> ReconcilerError {
        ReconcilerError::Conflict {
            kind: K::kind_name(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<K: Replicable> ObjectClient<K> for FakeCluster<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError> {
        Ok(self.object(namespace, name))
    }

    async fn list_by_labels(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, ReconcilerError> {
        let state = self.state.lock().expect("cluster lock");
        Ok(state
            .objects
            .values()
            .filter(|obj| {
                let labels = obj.meta().labels.clone().unwrap_or_default();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ReconcilerError> {
        let name = object.meta().name.clone().unwrap_or_default();
        {
            let mut state = self.state.lock().expect("cluster lock");
            if state.fail_creates_in.iter().any(|ns| ns == namespace) {
                return Err(ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
                    "admission webhook denied create in {namespace}"
                )));
            }
            if state.vanished_namespaces.iter().any(|ns| ns == namespace) {
                return Err(ReconcilerError::NotFound {
                    kind: "Namespace".to_string(),
                    namespace: String::new(),
                    name: namespace.to_string(),
                });
            }
            if state.objects.contains_key(&key(namespace, &name)) {
                return Err(Self::conflict(namespace, &name));
            }
            state.writes.push(format!("create {namespace}/{name}"));
        }
        let mut object = object.clone();
        object.meta_mut().namespace = Some(namespace.to_string());
        Ok(self.put(object))
    }

    async fn replace(&self, object: &K) -> Result<K, ReconcilerError> {
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        {
            let mut state = self.state.lock().expect("cluster lock");
            if state.conflicts_pending > 0 {
                state.conflicts_pending -= 1;
                return Err(Self::conflict(&namespace, &name));
            }
            if state.vanish_next_replace {
                state.vanish_next_replace = false;
                state.objects.remove(&key(&namespace, &name));
            }
            let Some(stored) = state.objects.get(&key(&namespace, &name)) else {
                return Err(ReconcilerError::NotFound {
                    kind: K::kind_name(),
                    namespace,
                    name,
                });
            };
            if stored.meta().resource_version != object.meta().resource_version {
                return Err(Self::conflict(&namespace, &name));
            }
            state.writes.push(format!("replace {namespace}/{name}"));

            // Last finalizer released on a deleting object: the server drops it
            let finalized = object.meta().deletion_timestamp.is_some()
                && object.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
            if finalized {
                state.objects.remove(&key(&namespace, &name));
                return Ok(object.clone());
            }
        }
        Ok(self.put(object.clone()))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, ReconcilerError> {
        Ok(self.remove(namespace, name))
    }
}

#[async_trait]
impl<K: Replicable> NamespaceClient for FakeCluster<K> {
    async fn list(&self) -> Result<Vec<Namespace>, ReconcilerError> {
        let state = self.state.lock().expect("cluster lock");
        Ok(state.namespaces.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Option<Namespace>, ReconcilerError> {
        let state = self.state.lock().expect("cluster lock");
        Ok(state.namespaces.get(name).cloned())
    }
}

pub fn namespace(name: &str, phase: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NamespaceStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Source metadata with replication switched on
pub fn source_meta(namespace: &str, name: &str, desired: Option<&str>) -> ObjectMeta {
    let mut annotations = BTreeMap::from([(
        REPLICATION_ALLOWED_ANNOTATION.to_string(),
        "true".to_string(),
    )]);
    if let Some(desired) = desired {
        annotations.insert(DESIRED_NAMESPACES_ANNOTATION.to_string(), desired.to_string());
    }
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
        annotations: Some(annotations),
        ..Default::default()
    }
}

pub fn config_map_source(namespace: &str, name: &str, desired: Option<&str>) -> ConfigMap {
    ConfigMap {
        metadata: source_meta(namespace, name, desired),
        data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
        ..Default::default()
    }
}

pub fn secret_source(namespace: &str, name: &str, desired: Option<&str>) -> Secret {
    Secret {
        metadata: source_meta(namespace, name, desired),
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(b"hunter2".to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Wire a reconciler to a fake cluster
pub fn reconciler<K: Replicable>(
    cluster: &Arc<FakeCluster<K>>,
    config: ReplicatorConfig,
) -> Reconciler<K> {
    let objects: Arc<dyn ObjectClient<K>> = Arc::clone(cluster) as Arc<dyn ObjectClient<K>>;
    let namespaces: Arc<dyn NamespaceClient> = Arc::clone(cluster) as Arc<dyn NamespaceClient>;
    Reconciler::new(objects, namespaces, Arc::new(config))
}

/// Reconcile until the outcome is no longer the short finalizer requeue
pub async fn reconcile_settled<K: Replicable>(
    reconciler: &Reconciler<K>,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let finalizer_requeue = ReconcileOutcome::Requeue(std::time::Duration::from_millis(
        namespace_replicator::constants::FINALIZER_REQUEUE_MS,
    ));
    let mut outcome = reconciler.reconcile(namespace, name).await?;
    for _ in 0..3 {
        if outcome != finalizer_requeue {
            break;
        }
        outcome = reconciler.reconcile(namespace, name).await?;
    }
    Ok(outcome)
}
