//! # Events
//!
//! Translation of watch events into reconcile requests.
//!
//! - `classifier`: restores create/update/delete from kube watcher events
//! - `mapper`: per-stream admission policies and request mapping
//! - `index`: replication index over the source reflector store

pub mod classifier;
pub mod index;
pub mod mapper;

pub use classifier::{classified, ClassifiedEvent, EventClassifier};
pub use index::SourceIndex;
pub use mapper::{
    namespace_admits, namespace_requests, replica_admits, replica_request, source_admits,
};
