//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `replicator_reconciliations_total{kind}` - Total number of reconciliations
//! - `replicator_reconciliation_errors_total{kind,reason}` - Total number of reconciliation errors
//! - `replicator_reconciliation_duration_seconds{kind}` - Duration of reconciliations
//! - `replicator_replica_operations_total{kind,operation}` - Replica creates, updates, deletes and skips
//! - `replicator_events_mapped_total{kind,stream}` - Watch events turned into reconcile requests
//! - `replicator_requeues_total{reason}` - Requeues by reason

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "replicator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "replicator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "replicator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REPLICA_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "replicator_replica_operations_total",
            "Total number of replica operations by outcome",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create REPLICA_OPERATIONS_TOTAL metric - this should never happen")
});

static EVENTS_MAPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "replicator_events_mapped_total",
            "Total number of watch events mapped to reconcile requests",
        ),
        &["kind", "stream"],
    )
    .expect("Failed to create EVENTS_MAPPED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("replicator_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// Safe to call once per process; a second call fails with a duplicate
/// registration error.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REPLICA_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENTS_MAPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

/// Gather every registered metric family
#[must_use]
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

/// Count a replica operation (`created`, `updated`, `unchanged`, `skipped`, `deleted`)
pub fn increment_replica_operations(kind: &str, operation: &str) {
    REPLICA_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_events_mapped(kind: &str, stream: &str) {
    EVENTS_MAPPED_TOTAL.with_label_values(&[kind, stream]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
