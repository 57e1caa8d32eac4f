//! # Runtime
//!
//! Process-level wiring: startup, the per-kind watch loops, error policy and
//! graceful shutdown.

pub mod error_policy;
pub mod initialization;
pub mod shutdown;
pub mod watch_loop;
