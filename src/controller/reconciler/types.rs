//! # Types
//!
//! Core types for the reconciler: the error taxonomy, operation outcomes and
//! per-resource backoff state.

use crate::controller::backoff::FibonacciBackoff;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the replication engine
///
/// `NotFound` is tolerated wherever an object may legitimately vanish between
/// enumeration and access. Everything else aborts the current invocation and is
/// re-enqueued by the controller's error policy.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("Conflict writing {kind} {namespace}/{name}: resource version is stale")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("Kind {0} has no replication binding")]
    UnsupportedKind(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Reconciliation cancelled by shutdown signal")]
    Cancelled,
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Classify a Kubernetes API error for the object it was issued against
    ///
    /// 404 becomes `NotFound`, 409 becomes `Conflict`, anything else stays a
    /// transient `Kube` error.
    #[must_use]
    pub fn from_kube(error: kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match &error {
            kube::Error::Api(api_err) if api_err.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(api_err) if api_err.code == 409 => Self::Conflict {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            _ => Self::Kube(error),
        }
    }

    /// Stable label for metrics and logs
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::Conflict { .. } => "conflict",
            Self::UnsupportedKind(_) => "unsupported-kind",
            Self::Kube(_) => "kube-api",
            Self::Cancelled => "cancelled",
            Self::ReconciliationFailed(_) => "reconciliation-failed",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result of a single upsert against one target namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Replica did not exist and was created
    Created,
    /// Replica existed and differed from the projection
    Updated,
    /// Replica already matched the projection, no write was issued
    Unchanged,
    /// Target holds an object owned by someone else, left untouched
    Skipped,
}

impl UpsertOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
            UpsertOutcome::Skipped => "skipped",
        }
    }
}

/// Outcome of one reconciliation of a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do for this invocation
    Done,
    /// Ask the queue to run this source again after the delay
    Requeue(Duration),
}

/// Event stream a reconcile request originated from
/// Tracks why a reconciliation was triggered for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStream {
    /// Create/update/delete of a source object
    Source,
    /// Update/delete of a replica (drift or tampering)
    Replica,
    /// Creation or update of an active namespace
    Namespace,
}

impl EventStream {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStream::Source => "source",
            EventStream::Replica => "replica",
            EventStream::Namespace => "namespace",
        }
    }
}

/// Backoff state for a specific source
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(backoff_start_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(backoff_start_ms, backoff_max_ms),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}
