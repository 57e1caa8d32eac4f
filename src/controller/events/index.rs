//! # Source Index
//!
//! Secondary index over replicable sources, used to fan a namespace event out
//! to every source that may need a replica there.
//!
//! Backed by the reflector store the source controller already maintains, so
//! the index costs no extra watch.

use crate::constants::{REPLICATION_ALLOWED_VALUE, REPLICATION_INDEX_FIELD};
use crate::controller::metadata::replication_allowed;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube_runtime::reflector::{ObjectRef, Store};
use std::fmt;

/// Index value for an object, `Some("true")` when replication is allowed
#[must_use]
pub fn index_value(meta: &ObjectMeta) -> Option<&'static str> {
    replication_allowed(meta).then_some(REPLICATION_ALLOWED_VALUE)
}

/// Replication index over a reflector store
#[derive(Clone)]
pub struct SourceIndex<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
}

impl<K> fmt::Debug for SourceIndex<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceIndex")
            .field("field", &REPLICATION_INDEX_FIELD)
            .field("cached", &self.store.state().len())
            .finish()
    }
}

impl<K> SourceIndex<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    #[must_use]
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }

    /// Identities of every cached source whose index value is `"true"`
    #[must_use]
    pub fn replication_enabled(&self) -> Vec<ObjectRef<K>> {
        self.store
            .state()
            .iter()
            .filter(|obj| index_value(obj.meta()) == Some(REPLICATION_ALLOWED_VALUE))
            .map(|obj| ObjectRef::from_obj(obj.as_ref()))
            .collect()
    }
}
