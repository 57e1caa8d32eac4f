//! # Cluster Client
//!
//! The narrow slice of the Kubernetes API the replication engine needs.
//!
//! The engine only talks to [`ObjectClient`] and [`NamespaceClient`], so the
//! same reconciliation code runs against the live cluster through
//! [`KubeClusterClient`] and against an in-memory cluster in tests.
//!
//! Every method maps API failures through [`ReconcilerError::from_kube`]:
//! a 404 surfaces as `NotFound` and a stale resource version as `Conflict`.

use crate::constants::FIELD_MANAGER;
use crate::controller::projection::ReplicaPayload;
use crate::controller::reconciler::types::ReconcilerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Everything a kind needs to be replicated by the engine
///
/// Blanket-implemented for any namespaced, statically typed resource that has
/// a [`ReplicaPayload`] binding.
pub trait Replicable:
    ReplicaPayload
    + Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Default
    + PartialEq
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind name used in logs, metrics and error messages
    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }
}

impl<K> Replicable for K where
    K: ReplicaPayload
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Default
        + PartialEq
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The API server accepted the deletion
    Deleted,
    /// The object was already gone
    AlreadyGone,
}

/// Namespaced object operations for one replicable kind
#[async_trait]
pub trait ObjectClient<K: Replicable>: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError>;

    /// List objects across all namespaces matching every label in `selector`
    async fn list_by_labels(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, ReconcilerError>;

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ReconcilerError>;

    /// Replace an object; fails with `Conflict` if its resource version is stale
    async fn replace(&self, object: &K) -> Result<K, ReconcilerError>;

    /// Delete an object, tolerating one that is already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, ReconcilerError>;
}

/// Read-only namespace lookups
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceClient: Send + Sync {
    async fn list(&self) -> Result<Vec<Namespace>, ReconcilerError>;

    /// Fetch a namespace by name, `None` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<Namespace>, ReconcilerError>;
}

/// Label-equality selector string accepted by the API server
#[must_use]
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ObjectClient`] and [`NamespaceClient`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl<K: Replicable> ObjectClient<K> for KubeClusterClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| ReconcilerError::from_kube(e, &K::kind_name(), namespace, name))
    }

    async fn list_by_labels(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, ReconcilerError> {
        let api: Api<K> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&selector_string(selector));
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = object.meta().name.clone().unwrap_or_default();
        api.create(&Self::post_params(), object)
            .await
            .map_err(|e| ReconcilerError::from_kube(e, &K::kind_name(), namespace, &name))
    }

    async fn replace(&self, object: &K) -> Result<K, ReconcilerError> {
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &Self::post_params(), object)
            .await
            .map_err(|e| ReconcilerError::from_kube(e, &K::kind_name(), &namespace, &name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(ReconcilerError::from_kube(e, &K::kind_name(), namespace, name)),
        }
    }
}

#[async_trait]
impl NamespaceClient for KubeClusterClient {
    async fn list(&self) -> Result<Vec<Namespace>, ReconcilerError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get(&self, name: &str) -> Result<Option<Namespace>, ReconcilerError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}
