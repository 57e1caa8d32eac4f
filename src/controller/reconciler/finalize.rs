//! # Finalize
//!
//! Replica cleanup for deleted or retired sources, and opt-in pruning of
//! replicas that fell out of the target set.

use super::types::ReconcilerError;
use super::Reconciler;
use crate::controller::client::{DeleteOutcome, Replicable};
use crate::controller::metadata::{provenance_selector, remove_finalizer};
use crate::observability;
use tracing::{debug, info};

impl<K: Replicable> Reconciler<K> {
    /// Delete every replica of `source` and release its finalizer
    ///
    /// Replicas that vanish concurrently and a source that is already gone are
    /// both tolerated.
    pub async fn finalize(&self, source: &K) -> Result<(), ReconcilerError> {
        let removed = self.delete_replicas(source, &[]).await?;

        let mut updated = source.clone();
        if remove_finalizer(updated.meta_mut()) {
            match self.objects.replace(&updated).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Source disappeared before its finalizer was released");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            resource.namespace = source.meta().namespace.as_deref().unwrap_or_default(),
            resource.name = source.meta().name.as_deref().unwrap_or_default(),
            kind = K::kind_name().as_str(),
            removed,
            "Finalizer released after replica cleanup"
        );
        Ok(())
    }

    /// Delete replicas of `source` whose namespace is not in `keep`
    ///
    /// Replicas are discovered through the provenance label selector. Returns
    /// the number of deletions the API server accepted.
    pub async fn delete_replicas(
        &self,
        source: &K,
        keep: &[String],
    ) -> Result<usize, ReconcilerError> {
        let kind = K::kind_name();
        let source_namespace = source.meta().namespace.clone().unwrap_or_default();
        let source_name = source.meta().name.clone().unwrap_or_default();

        let selector = provenance_selector(&source_namespace, &source_name);
        let replicas = self.objects.list_by_labels(&selector).await?;

        let mut removed = 0;
        for replica in replicas {
            let namespace = replica.meta().namespace.clone().unwrap_or_default();
            let name = replica.meta().name.clone().unwrap_or_default();
            if keep.contains(&namespace)
                || (namespace == source_namespace && name == source_name)
            {
                continue;
            }

            match self.objects.delete(&namespace, &name).await? {
                DeleteOutcome::Deleted => {
                    removed += 1;
                    observability::metrics::increment_replica_operations(&kind, "deleted");
                    info!(
                        replica.namespace = namespace.as_str(),
                        replica.name = name.as_str(),
                        kind = kind.as_str(),
                        outcome = "deleted",
                        "Replica deleted"
                    );
                }
                DeleteOutcome::AlreadyGone => {
                    debug!(
                        replica.namespace = namespace.as_str(),
                        replica.name = name.as_str(),
                        "Replica already gone"
                    );
                }
            }
        }

        if removed > 0 && !keep.is_empty() {
            info!(
                kind = kind.as_str(),
                removed,
                "Pruned replicas outside the target set"
            );
        }
        Ok(removed)
    }
}
