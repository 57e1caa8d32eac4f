//! # Controller
//!
//! Core controller modules for the namespace replicator.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `client`: the cluster API seam used by the engine
//! - `events`: watch event classification and request mapping
//! - `metadata`: ownership labels, annotations and finalizer helpers
//! - `projection`: per-kind payload bindings and field projection
//! - `reconciler`: the replication state machine
//! - `server`: HTTP server for metrics and health checks
//! - `targets`: target namespace resolution

pub mod backoff;
pub mod client;
pub mod events;
pub mod metadata;
pub mod projection;
pub mod reconciler;
pub mod server;
pub mod targets;
