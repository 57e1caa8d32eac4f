//! # Event-to-Request Mapper
//!
//! Admission policies and request mapping for the three event streams that
//! feed the reconcile queue.
//!
//! | Stream    | Admits                                      | Maps to                         |
//! |-----------|---------------------------------------------|---------------------------------|
//! | source    | create/update/delete of replicable objects  | the object itself               |
//! | replica   | update/delete of objects with provenance    | the source named in the labels  |
//! | namespace | create/update of `Active` namespaces        | every source in the index       |

use super::classifier::ClassifiedEvent;
use super::index::SourceIndex;
use crate::constants::{NAMESPACE_PHASE_ACTIVE, SOURCE_NAMESPACE_LABEL, SOURCE_NAME_LABEL};
use crate::controller::client::Replicable;
use crate::controller::metadata::{has_finalizer, has_labels, provenance, replication_allowed};
use crate::controller::reconciler::types::EventStream;
use crate::observability;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube_runtime::reflector::ObjectRef;
use tracing::trace;

/// A source is watched while replication is enabled or our finalizer is still on it
fn watched_source(meta: &ObjectMeta) -> bool {
    replication_allowed(meta) || has_finalizer(meta)
}

fn carries_provenance(meta: &ObjectMeta) -> bool {
    has_labels(meta, &[SOURCE_NAMESPACE_LABEL, SOURCE_NAME_LABEL])
}

/// Source stream admission
///
/// Updates are admitted when either side is watched, so switching replication
/// off still reaches the reconciler.
pub fn source_admits<K: Resource>(event: &ClassifiedEvent<K>) -> bool {
    match event {
        ClassifiedEvent::Create(obj) | ClassifiedEvent::Delete(obj) => watched_source(obj.meta()),
        ClassifiedEvent::Update { old, new } => watched_source(old) || watched_source(new.meta()),
    }
}

/// Replica stream admission
///
/// Creates are never admitted: the engine made them. Updates are judged on
/// the previous metadata so stripping the labels is still noticed.
pub fn replica_admits<K: Resource>(event: &ClassifiedEvent<K>) -> bool {
    match event {
        ClassifiedEvent::Create(_) => false,
        ClassifiedEvent::Update { old, .. } => carries_provenance(old),
        ClassifiedEvent::Delete(obj) => carries_provenance(obj.meta()),
    }
}

/// Namespace stream admission
pub fn namespace_admits(event: &ClassifiedEvent<Namespace>) -> bool {
    match event {
        ClassifiedEvent::Create(ns) | ClassifiedEvent::Update { new: ns, .. } => ns
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            == Some(NAMESPACE_PHASE_ACTIVE),
        ClassifiedEvent::Delete(_) => false,
    }
}

/// Request for the source a replica event points at
pub fn replica_request<K: Replicable>(event: &ClassifiedEvent<K>) -> Option<ObjectRef<K>> {
    if !replica_admits(event) {
        return None;
    }
    let meta = match event {
        ClassifiedEvent::Update { old, .. } => old,
        ClassifiedEvent::Create(obj) | ClassifiedEvent::Delete(obj) => obj.meta(),
    };
    let source = provenance(meta)?;
    trace!(
        source.namespace = source.namespace.as_str(),
        source.name = source.name.as_str(),
        event = event.as_str(),
        "Replica event mapped to source"
    );
    record(&K::kind_name(), EventStream::Replica);
    Some(ObjectRef::new(&source.name).within(&source.namespace))
}

/// Requests for every replicable source after a namespace event
pub fn namespace_requests<K: Replicable>(
    event: &ClassifiedEvent<Namespace>,
    index: &SourceIndex<K>,
) -> Vec<ObjectRef<K>> {
    if !namespace_admits(event) {
        return Vec::new();
    }
    let requests = index.replication_enabled();
    let kind = K::kind_name();
    for _ in &requests {
        record(&kind, EventStream::Namespace);
    }
    trace!(
        namespace = event.object().metadata.name.as_deref().unwrap_or_default(),
        sources = requests.len(),
        "Namespace event fanned out to sources"
    );
    requests
}

/// Count a request produced by a stream
pub fn record(kind: &str, stream: EventStream) {
    observability::metrics::increment_events_mapped(kind, stream.as_str());
}
