//! # Observability
//!
//! Observability modules for metrics and logging.
//!
//! - `metrics`: Prometheus metrics collection
//! - `logging`: tracing subscriber setup

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use metrics::*;
