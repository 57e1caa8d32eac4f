//! # Upsert
//!
//! Creates or updates the replica of a source in one target namespace.

use super::types::{ReconcilerError, UpsertOutcome};
use super::Reconciler;
use crate::controller::client::Replicable;
use crate::controller::metadata::{provenance, replication_allowed, Provenance};
use crate::controller::projection::project;
use crate::observability;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info, warn};

/// True when `existing` belongs to something other than `source`
///
/// Objects that are themselves replicable sources, or whose provenance names a
/// different source, must not be overwritten. Unlabelled objects are adopted.
#[must_use]
pub fn owned_by_other(source: &ObjectMeta, existing: &ObjectMeta) -> bool {
    if replication_allowed(existing) {
        return true;
    }
    match provenance(existing) {
        Some(Provenance { namespace, name }) => {
            source.namespace.as_deref() != Some(namespace.as_str())
                || source.name.as_deref() != Some(name.as_str())
        }
        None => false,
    }
}

impl<K: Replicable> Reconciler<K> {
    /// Make the replica of `source` in `target_namespace` match the projection
    ///
    /// Issues at most one write. A stale resource version surfaces as
    /// `Conflict` and is left to the queue to retry. A namespace or replica
    /// that vanishes mid-flight yields `Skipped`.
    pub async fn upsert(
        &self,
        source: &K,
        target_namespace: &str,
    ) -> Result<UpsertOutcome, ReconcilerError> {
        let kind = K::kind_name();
        let name = source.meta().name.clone().unwrap_or_default();

        let outcome = match self.objects.get(target_namespace, &name).await? {
            None => {
                let mut replica = K::default();
                replica.meta_mut().name = Some(name.clone());
                replica.meta_mut().namespace = Some(target_namespace.to_string());
                project(source, &mut replica)?;
                match self.objects.create(target_namespace, &replica).await {
                    Ok(_) => UpsertOutcome::Created,
                    Err(e) if e.is_not_found() => {
                        debug!(
                            replica.namespace = target_namespace,
                            replica.name = name.as_str(),
                            kind = kind.as_str(),
                            "Target namespace disappeared before the replica was created"
                        );
                        UpsertOutcome::Skipped
                    }
                    Err(e) => return Err(e),
                }
            }
            Some(existing) if owned_by_other(source.meta(), existing.meta()) => {
                warn!(
                    replica.namespace = target_namespace,
                    replica.name = name.as_str(),
                    kind = kind.as_str(),
                    "Target object is not a replica of this source, leaving it untouched"
                );
                UpsertOutcome::Skipped
            }
            Some(existing) => {
                let mut replica = existing.clone();
                project(source, &mut replica)?;
                if replica == existing {
                    UpsertOutcome::Unchanged
                } else {
                    match self.objects.replace(&replica).await {
                        Ok(_) => UpsertOutcome::Updated,
                        // The replica delete event requeues the source
                        Err(e) if e.is_not_found() => {
                            debug!(
                                replica.namespace = target_namespace,
                                replica.name = name.as_str(),
                                kind = kind.as_str(),
                                "Replica disappeared before it could be updated"
                            );
                            UpsertOutcome::Skipped
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        observability::metrics::increment_replica_operations(&kind, outcome.as_str());
        match outcome {
            UpsertOutcome::Created | UpsertOutcome::Updated => info!(
                replica.namespace = target_namespace,
                replica.name = name.as_str(),
                kind = kind.as_str(),
                outcome = outcome.as_str(),
                "Replica {}",
                outcome.as_str()
            ),
            UpsertOutcome::Unchanged | UpsertOutcome::Skipped => debug!(
                replica.namespace = target_namespace,
                replica.name = name.as_str(),
                kind = kind.as_str(),
                outcome = outcome.as_str(),
                "Replica {}",
                outcome.as_str()
            ),
        }
        Ok(outcome)
    }
}
