//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use namespace_replicator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - The cluster seam (`ObjectClient`, `NamespaceClient`, `Replicable`)
//! - Reconciler types (Reconciler, ReconcilerError, outcomes)
//! - Config types (ReplicatorConfig, ServerConfig)

// Cluster seam - implemented by the live client and by test fakes
pub use crate::controller::client::{
    DeleteOutcome, KubeClusterClient, NamespaceClient, ObjectClient, Replicable,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    BackoffState, EventStream, ReconcileOutcome, Reconciler, ReconcilerError, UpsertOutcome,
};

// Projection - payload binding per kind
pub use crate::controller::projection::{project, ReplicaPayload};

// Config types - for configuration management
pub use crate::config::{ReplicatedKind, ReplicatorConfig, ServerConfig};
