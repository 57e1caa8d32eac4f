//! # Configuration
//!
//! Controller and server settings loaded from environment variables.
//!
//! - `controller`: replication engine and runtime settings
//! - `server`: HTTP server settings for metrics and probes
//!
//! Every loader has a `from_lookup` twin taking a key lookup function, so tests
//! can supply values without touching the process environment.

pub mod controller;
pub mod server;

pub use controller::{ReplicatedKind, ReplicatorConfig};
pub use server::ServerConfig;

use std::str::FromStr;

/// Read a variable through `lookup` or return the default value
///
/// Values that fail to parse fall back to the default.
pub(crate) fn var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable as boolean or return the default
pub(crate) fn var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.trim().to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read a variable as string or return the default
pub(crate) fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Lookup backed by the process environment
pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
