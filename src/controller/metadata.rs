//! # Ownership Metadata
//!
//! Pure predicates and mutators over an object's labels, annotations and
//! finalizers. Nothing here performs I/O.
//!
//! Functions take `&ObjectMeta` so they work both on live objects
//! (`obj.meta()`) and on the metadata snapshots the event classifier keeps.

use crate::constants::{
    REPLICATION_ALLOWED_ANNOTATION, REPLICATION_ALLOWED_VALUE, SOURCE_FINALIZER,
    SOURCE_NAMESPACE_LABEL, SOURCE_NAME_LABEL,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Identity of a source as recorded in a replica's provenance labels
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provenance {
    pub namespace: String,
    pub name: String,
}

/// True iff every key is present in the annotations (values are not inspected)
#[must_use]
pub fn has_annotations(meta: &ObjectMeta, keys: &[&str]) -> bool {
    matching_items(meta.annotations.as_ref(), keys)
}

/// True iff every key is present in the labels (values are not inspected)
#[must_use]
pub fn has_labels(meta: &ObjectMeta, keys: &[&str]) -> bool {
    matching_items(meta.labels.as_ref(), keys)
}

fn matching_items(items: Option<&BTreeMap<String, String>>, keys: &[&str]) -> bool {
    match items {
        Some(items) => keys.iter().all(|key| items.contains_key(*key)),
        None => keys.is_empty(),
    }
}

/// Replication is enabled only when the annotation carries the literal `"true"`
#[must_use]
pub fn replication_allowed(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(REPLICATION_ALLOWED_ANNOTATION))
        .is_some_and(|value| value == REPLICATION_ALLOWED_VALUE)
}

/// Read the source identity from the provenance labels
///
/// Returns `None` unless both labels are present.
#[must_use]
pub fn provenance(meta: &ObjectMeta) -> Option<Provenance> {
    let labels = meta.labels.as_ref()?;
    let namespace = labels.get(SOURCE_NAMESPACE_LABEL)?;
    let name = labels.get(SOURCE_NAME_LABEL)?;
    Some(Provenance {
        namespace: namespace.clone(),
        name: name.clone(),
    })
}

/// Label-equality selector matching every replica of a source
#[must_use]
pub fn provenance_selector(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SOURCE_NAMESPACE_LABEL.to_string(), namespace.to_string()),
        (SOURCE_NAME_LABEL.to_string(), name.to_string()),
    ])
}

#[must_use]
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == SOURCE_FINALIZER))
}

/// Add the source finalizer, returning whether the metadata changed
pub fn add_finalizer(meta: &mut ObjectMeta) -> bool {
    if has_finalizer(meta) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(SOURCE_FINALIZER.to_string());
    true
}

/// Remove the source finalizer, returning whether the metadata changed
pub fn remove_finalizer(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != SOURCE_FINALIZER);
    before != finalizers.len()
}

/// True once the API server has stamped a deletion timestamp
#[must_use]
pub fn is_deleting(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DESIRED_NAMESPACES_ANNOTATION;

    fn meta_with(
        labels: &[(&str, &str)],
        annotations: &[(&str, &str)],
    ) -> ObjectMeta {
        let to_map = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        ObjectMeta {
            name: Some("cfg".to_string()),
            namespace: Some("default".to_string()),
            labels: Some(to_map(labels)),
            annotations: Some(to_map(annotations)),
            ..Default::default()
        }
    }

    #[test]
    fn test_has_annotations_requires_all_keys() {
        let meta = meta_with(&[], &[(REPLICATION_ALLOWED_ANNOTATION, "false")]);
        assert!(has_annotations(&meta, &[REPLICATION_ALLOWED_ANNOTATION]));
        assert!(!has_annotations(
            &meta,
            &[REPLICATION_ALLOWED_ANNOTATION, DESIRED_NAMESPACES_ANNOTATION]
        ));
    }

    #[test]
    fn test_has_labels_on_empty_metadata() {
        let meta = ObjectMeta::default();
        assert!(!has_labels(&meta, &[SOURCE_NAME_LABEL]));
        assert!(has_labels(&meta, &[]));
    }

    #[test]
    fn test_replication_allowed_checks_value() {
        let enabled = meta_with(&[], &[(REPLICATION_ALLOWED_ANNOTATION, "true")]);
        let disabled = meta_with(&[], &[(REPLICATION_ALLOWED_ANNOTATION, "false")]);
        let uppercase = meta_with(&[], &[(REPLICATION_ALLOWED_ANNOTATION, "True")]);
        assert!(replication_allowed(&enabled));
        assert!(!replication_allowed(&disabled));
        assert!(!replication_allowed(&uppercase));
        assert!(!replication_allowed(&ObjectMeta::default()));
    }

    #[test]
    fn test_provenance_needs_both_labels() {
        let replica = meta_with(
            &[
                (SOURCE_NAMESPACE_LABEL, "default"),
                (SOURCE_NAME_LABEL, "cfg"),
            ],
            &[],
        );
        assert_eq!(
            provenance(&replica),
            Some(Provenance {
                namespace: "default".into(),
                name: "cfg".into(),
            })
        );

        let partial = meta_with(&[(SOURCE_NAME_LABEL, "cfg")], &[]);
        assert_eq!(provenance(&partial), None);
    }

    #[test]
    fn test_provenance_selector_round_trips_through_labels() {
        let meta = ObjectMeta {
            labels: Some(provenance_selector("default", "cfg")),
            ..Default::default()
        };
        let found = provenance(&meta).expect("provenance labels");
        assert_eq!(found.namespace, "default");
        assert_eq!(found.name, "cfg");
    }

    #[test]
    fn test_finalizer_add_remove_report_changes() {
        let mut meta = ObjectMeta::default();
        assert!(!has_finalizer(&meta));
        assert!(add_finalizer(&mut meta));
        assert!(!add_finalizer(&mut meta));
        assert_eq!(meta.finalizers.as_ref().map(Vec::len), Some(1));

        meta.finalizers
            .as_mut()
            .expect("finalizers")
            .push("other.io/keep".to_string());
        assert!(remove_finalizer(&mut meta));
        assert!(!remove_finalizer(&mut meta));
        assert_eq!(
            meta.finalizers,
            Some(vec!["other.io/keep".to_string()])
        );
    }
}
