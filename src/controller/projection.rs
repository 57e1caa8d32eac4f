//! # Field Projection
//!
//! Copies the replicated payload and the bookkeeping metadata from a source
//! object onto its replica.
//!
//! Each replicable kind provides a [`ReplicaPayload`] binding that knows which
//! fields make up its payload. Adding a kind means adding one binding; the
//! engine never switches on kinds itself.
//!
//! Projection is deterministic: running it twice with the same source leaves
//! the replica byte-for-byte identical, which is what lets the upsert detect
//! an unchanged replica and skip the write.

use crate::constants::{
    DESIRED_NAMESPACES_ANNOTATION, REPLICATION_ALLOWED_ANNOTATION, SOURCE_NAMESPACE_LABEL,
    SOURCE_NAME_LABEL, SOURCE_VERSION_ANNOTATION,
};
use crate::controller::reconciler::types::ReconcilerError;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::Resource;

/// Kind-specific payload binding
pub trait ReplicaPayload {
    /// Copy the payload fields of `source` onto `self`
    ///
    /// Must not mutate `self` when returning an error.
    fn copy_payload_from(&mut self, source: &Self) -> Result<(), ReconcilerError>;
}

impl ReplicaPayload for ConfigMap {
    fn copy_payload_from(&mut self, source: &Self) -> Result<(), ReconcilerError> {
        self.data.clone_from(&source.data);
        self.binary_data.clone_from(&source.binary_data);
        self.immutable = source.immutable;
        Ok(())
    }
}

impl ReplicaPayload for Secret {
    fn copy_payload_from(&mut self, source: &Self) -> Result<(), ReconcilerError> {
        self.data.clone_from(&source.data);
        self.string_data.clone_from(&source.string_data);
        self.type_.clone_from(&source.type_);
        self.immutable = source.immutable;
        Ok(())
    }
}

/// Untyped objects are projected field by field when they are shaped like a
/// ConfigMap or a Secret. Any other kind has no binding.
///
/// Only for direct [`project`] callers: `DynamicObject` carries an
/// `ApiResource` as its dynamic type, so it is not [`Replicable`] and no
/// [`Reconciler`] runs over it.
///
/// [`Replicable`]: crate::controller::client::Replicable
/// [`Reconciler`]: crate::controller::reconciler::Reconciler
impl ReplicaPayload for DynamicObject {
    fn copy_payload_from(&mut self, source: &Self) -> Result<(), ReconcilerError> {
        let kind = source
            .types
            .as_ref()
            .map(|types| types.kind.as_str())
            .unwrap_or_default();
        let fields: &[&str] = match kind {
            "ConfigMap" => &["data", "binaryData", "immutable"],
            "Secret" => &["data", "stringData", "type", "immutable"],
            "" => return Err(ReconcilerError::UnsupportedKind("<unknown>".to_string())),
            other => return Err(ReconcilerError::UnsupportedKind(other.to_string())),
        };
        if let Some(target) = self.types.as_ref() {
            if target.kind != kind {
                return Err(ReconcilerError::UnsupportedKind(target.kind.clone()));
            }
        }

        if !self.data.is_object() {
            self.data = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(target) = self.data.as_object_mut() {
            for field in fields {
                match source.data.get(*field) {
                    Some(value) => {
                        target.insert((*field).to_string(), value.clone());
                    }
                    None => {
                        target.remove(*field);
                    }
                }
            }
        }
        if self.types.is_none() {
            self.types.clone_from(&source.types);
        }
        Ok(())
    }
}

/// Project `source` onto `replica` in place
///
/// The payload is copied first so an unsupported kind leaves the replica
/// untouched. Labels and annotations are then replaced wholesale by the
/// source's, with provenance written last so stale provenance on the source
/// never leaks onto the replica.
pub fn project<K>(source: &K, replica: &mut K) -> Result<(), ReconcilerError>
where
    K: ReplicaPayload + Resource,
{
    replica.copy_payload_from(source)?;

    let source_meta = source.meta();
    let replica_meta = replica.meta_mut();
    project_labels(source_meta, replica_meta);
    project_annotations(source_meta, replica_meta);
    Ok(())
}

fn project_labels(source: &ObjectMeta, replica: &mut ObjectMeta) {
    let mut labels = source.labels.clone().unwrap_or_default();
    labels.insert(
        SOURCE_NAMESPACE_LABEL.to_string(),
        source.namespace.clone().unwrap_or_default(),
    );
    labels.insert(
        SOURCE_NAME_LABEL.to_string(),
        source.name.clone().unwrap_or_default(),
    );
    replica.labels = Some(labels);
}

fn project_annotations(source: &ObjectMeta, replica: &mut ObjectMeta) {
    let mut annotations = source.annotations.clone().unwrap_or_default();
    // Control annotations must never turn a replica into a source
    annotations.remove(REPLICATION_ALLOWED_ANNOTATION);
    annotations.remove(DESIRED_NAMESPACES_ANNOTATION);
    annotations.insert(
        SOURCE_VERSION_ANNOTATION.to_string(),
        source.resource_version.clone().unwrap_or_default(),
    );
    replica.annotations = Some(annotations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::core::{ApiResource, GroupVersionKind, TypeMeta};
    use std::collections::BTreeMap;

    fn source_config_map() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cfg".to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some("42".to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "web".to_string()),
                    (SOURCE_NAME_LABEL.to_string(), "stale".to_string()),
                ])),
                annotations: Some(BTreeMap::from([
                    (REPLICATION_ALLOWED_ANNOTATION.to_string(), "true".to_string()),
                    (DESIRED_NAMESPACES_ANNOTATION.to_string(), "team-a".to_string()),
                    ("team".to_string(), "platform".to_string()),
                ])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("foo".to_string(), "bar".to_string())])),
            binary_data: Some(BTreeMap::from([(
                "blob".to_string(),
                ByteString(vec![1, 2, 3]),
            )])),
            immutable: Some(false),
        }
    }

    fn empty_replica(namespace: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cfg".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_project_copies_config_map_payload() {
        let source = source_config_map();
        let mut replica = empty_replica("team-a");

        project(&source, &mut replica).expect("projection succeeds");

        assert_eq!(replica.data, source.data);
        assert_eq!(replica.binary_data, source.binary_data);
        assert_eq!(replica.immutable, Some(false));
        // Identity of the replica is not touched
        assert_eq!(replica.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(replica.metadata.name.as_deref(), Some("cfg"));
    }

    #[test]
    fn test_project_overwrites_stale_provenance() {
        let source = source_config_map();
        let mut replica = empty_replica("team-a");

        project(&source, &mut replica).expect("projection succeeds");

        let labels = replica.metadata.labels.expect("labels");
        assert_eq!(labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(
            labels.get(SOURCE_NAMESPACE_LABEL).map(String::as_str),
            Some("default")
        );
        assert_eq!(labels.get(SOURCE_NAME_LABEL).map(String::as_str), Some("cfg"));
    }

    #[test]
    fn test_project_strips_control_annotations() {
        let source = source_config_map();
        let mut replica = empty_replica("team-a");

        project(&source, &mut replica).expect("projection succeeds");

        let annotations = replica.metadata.annotations.expect("annotations");
        assert!(!annotations.contains_key(REPLICATION_ALLOWED_ANNOTATION));
        assert!(!annotations.contains_key(DESIRED_NAMESPACES_ANNOTATION));
        assert_eq!(annotations.get("team").map(String::as_str), Some("platform"));
        assert_eq!(
            annotations.get(SOURCE_VERSION_ANNOTATION).map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn test_project_replaces_replica_metadata() {
        let source = source_config_map();
        let mut replica = empty_replica("team-a");
        replica.metadata.labels = Some(BTreeMap::from([(
            "edited-by".to_string(),
            "human".to_string(),
        )]));
        replica.data = Some(BTreeMap::from([("foo".to_string(), "tampered".to_string())]));

        project(&source, &mut replica).expect("projection succeeds");

        assert!(!replica
            .metadata
            .labels
            .as_ref()
            .expect("labels")
            .contains_key("edited-by"));
        assert_eq!(replica.data, source.data);
    }

    #[test]
    fn test_project_is_idempotent() {
        let source = source_config_map();
        let mut once = empty_replica("team-a");
        project(&source, &mut once).expect("projection succeeds");

        let mut twice = once.clone();
        project(&source, &mut twice).expect("projection succeeds");

        assert_eq!(once, twice);
    }

    #[test]
    fn test_project_secret_payload() {
        let source = Secret {
            metadata: ObjectMeta {
                name: Some("creds".to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some("7".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "password".to_string(),
                ByteString(b"hunter2".to_vec()),
            )])),
            type_: Some("Opaque".to_string()),
            immutable: Some(true),
            ..Default::default()
        };
        let mut replica = Secret::default();

        project(&source, &mut replica).expect("projection succeeds");

        assert_eq!(replica.data, source.data);
        assert_eq!(replica.type_.as_deref(), Some("Opaque"));
        assert_eq!(replica.immutable, Some(true));
        assert_eq!(
            replica
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(SOURCE_VERSION_ANNOTATION))
                .map(String::as_str),
            Some("7")
        );
    }

    fn dynamic(kind: &str, data: serde_json::Value) -> DynamicObject {
        let gvk = GroupVersionKind::gvk("", "v1", kind);
        let mut obj = DynamicObject::new("cfg", &ApiResource::from_gvk(&gvk))
            .within("default")
            .data(data);
        obj.types = Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
        });
        obj
    }

    #[test]
    fn test_project_dynamic_config_map() {
        let source = dynamic(
            "ConfigMap",
            serde_json::json!({ "data": { "foo": "bar" }, "immutable": true }),
        );
        let mut replica = dynamic(
            "ConfigMap",
            serde_json::json!({ "binaryData": { "old": "AQI=" } }),
        );

        project(&source, &mut replica).expect("projection succeeds");

        assert_eq!(
            replica.data,
            serde_json::json!({ "data": { "foo": "bar" }, "immutable": true })
        );
    }

    #[test]
    fn test_project_unsupported_kind_leaves_replica_untouched() {
        let source = dynamic("Pod", serde_json::json!({ "spec": {} }));
        let mut replica = dynamic("Pod", serde_json::json!({ "spec": { "x": 1 } }));
        let before = replica.clone();

        let err = project(&source, &mut replica).expect_err("pods have no binding");

        assert!(matches!(err, ReconcilerError::UnsupportedKind(kind) if kind == "Pod"));
        assert_eq!(replica, before);
    }

    #[test]
    fn test_project_mismatched_dynamic_kinds() {
        let source = dynamic("ConfigMap", serde_json::json!({ "data": {} }));
        let mut replica = dynamic("Secret", serde_json::json!({}));
        let before = replica.clone();

        let err = project(&source, &mut replica).expect_err("kinds differ");

        assert!(matches!(err, ReconcilerError::UnsupportedKind(kind) if kind == "Secret"));
        assert_eq!(replica, before);
    }
}
