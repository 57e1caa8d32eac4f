//! # Reconciler
//!
//! The replication engine for one replicable kind.
//!
//! The reconciler:
//! - Adds a finalizer to every replicable source it sees
//! - Resolves the target namespace set and upserts one replica per target
//! - Deletes every replica and releases the finalizer when the source is
//!   deleted or replication is switched off
//! - Optionally prunes replicas whose namespace left the target set
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the source (missing means done)
//! 2. Deleting or retiring: clean up replicas, remove the finalizer
//! 3. No finalizer yet: add it and requeue shortly
//! 4. Otherwise: resolve targets, upsert each, prune if enabled

pub mod finalize;
pub mod reconcile;
pub mod types;
pub mod upsert;

pub use types::{BackoffState, EventStream, ReconcileOutcome, ReconcilerError, UpsertOutcome};

use crate::config::ReplicatorConfig;
use crate::controller::client::{NamespaceClient, ObjectClient, Replicable};
use crate::controller::targets;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Reconciler context for kind `K`
pub struct Reconciler<K: Replicable> {
    objects: Arc<dyn ObjectClient<K>>,
    namespaces: Arc<dyn NamespaceClient>,
    config: Arc<ReplicatorConfig>,
    /// Per-source backoff state, keyed `kind/namespace/name`
    /// Owned here so the error policy and successful reconciles share it
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: Replicable> fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: Replicable> Reconciler<K> {
    #[must_use]
    pub fn new(
        objects: Arc<dyn ObjectClient<K>>,
        namespaces: Arc<dyn NamespaceClient>,
        config: Arc<ReplicatorConfig>,
    ) -> Self {
        Self {
            objects,
            namespaces,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Compute the namespaces that should hold a replica of `source`
    pub async fn resolve_targets(&self, source: &K) -> Result<Vec<String>, ReconcilerError> {
        targets::resolve_targets(
            source.meta(),
            self.namespaces.as_ref(),
            &self.config.disallowed_namespaces,
        )
        .await
    }

    /// Key under which backoff state for a source is tracked
    #[must_use]
    pub fn backoff_key(namespace: &str, name: &str) -> String {
        format!("{}/{}/{}", K::kind_name(), namespace, name)
    }

    /// Reset the backoff state of a source after a successful reconcile
    ///
    /// Returns whether the source had been failing.
    pub fn reset_backoff(&self, namespace: &str, name: &str) -> bool {
        let Ok(mut states) = self.backoff_states.lock() else {
            return false;
        };
        states
            .remove(&Self::backoff_key(namespace, name))
            .is_some_and(|state| state.error_count > 0)
    }
}
