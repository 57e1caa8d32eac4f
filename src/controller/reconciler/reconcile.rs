//! # Reconcile
//!
//! The per-source state machine.
//!
//! ```text
//! Fetching ─┬─ missing ──────────────────────────────► Done
//!           ├─ deleting / retiring ─► Finalizing ────► Done
//!           ├─ not replicable ───────────────────────► Done
//!           ├─ no finalizer ─► add finalizer ────────► Requeue(1s)
//!           └─ active ─► resolve ─► upsert each ─► prune? ─► Done | Requeue(resync)
//! ```
//!
//! Every invocation re-reads the source, so a request that sat in the queue
//! always acts on current state.

use super::types::{ReconcileOutcome, ReconcilerError};
use super::Reconciler;
use crate::constants::FINALIZER_REQUEUE_MS;
use crate::controller::client::Replicable;
use crate::controller::metadata::{add_finalizer, has_finalizer, is_deleting, replication_allowed};
use crate::observability;
use std::time::{Duration, Instant};
use tracing::{debug, info};

impl<K: Replicable> Reconciler<K> {
    /// Reconcile the source identified by `namespace`/`name`
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let kind = K::kind_name();
        let start = Instant::now();
        observability::metrics::increment_reconciliations(&kind);

        let result = self.reconcile_source(&kind, namespace, name).await;

        observability::metrics::observe_reconciliation_duration(
            &kind,
            start.elapsed().as_secs_f64(),
        );
        if result.is_ok() && self.reset_backoff(namespace, name) {
            info!(
                resource.namespace = namespace,
                resource.name = name,
                kind = kind.as_str(),
                "✅ Reconciliation recovered, backoff reset"
            );
        }
        result
    }

    async fn reconcile_source(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(source) = self.objects.get(namespace, name).await? else {
            debug!(
                resource.namespace = namespace,
                resource.name = name,
                kind,
                "Source no longer exists, nothing to reconcile"
            );
            return Ok(ReconcileOutcome::Done);
        };

        let meta = source.meta();
        let allowed = replication_allowed(meta);
        let finalizer = has_finalizer(meta);

        if is_deleting(meta) {
            if finalizer {
                info!(
                    resource.namespace = namespace,
                    resource.name = name,
                    kind,
                    "Source is being deleted, removing replicas"
                );
                self.finalize(&source).await?;
            }
            return Ok(ReconcileOutcome::Done);
        }

        if !allowed {
            if finalizer {
                info!(
                    resource.namespace = namespace,
                    resource.name = name,
                    kind,
                    "Replication disabled on source, retiring replicas"
                );
                self.finalize(&source).await?;
            }
            return Ok(ReconcileOutcome::Done);
        }

        if !finalizer {
            let mut updated = source.clone();
            add_finalizer(updated.meta_mut());
            match self.objects.replace(&updated).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(
                        resource.namespace = namespace,
                        resource.name = name,
                        kind,
                        "Source disappeared before the finalizer was added"
                    );
                    return Ok(ReconcileOutcome::Done);
                }
                Err(e) => return Err(e),
            }
            debug!(
                resource.namespace = namespace,
                resource.name = name,
                kind,
                "Added finalizer to source"
            );
            return Ok(ReconcileOutcome::Requeue(Duration::from_millis(
                FINALIZER_REQUEUE_MS,
            )));
        }

        let targets = self.resolve_targets(&source).await?;
        for target in &targets {
            // First failure aborts the fan-out; the whole source is retried
            self.upsert(&source, target).await?;
        }

        if self.config.prune_stale_replicas {
            self.delete_replicas(&source, &targets).await?;
        }

        debug!(
            resource.namespace = namespace,
            resource.name = name,
            kind,
            targets = targets.len(),
            "Source replicated"
        );

        Ok(match self.config.resync_interval() {
            Some(interval) => ReconcileOutcome::Requeue(interval),
            None => ReconcileOutcome::Done,
        })
    }
}
