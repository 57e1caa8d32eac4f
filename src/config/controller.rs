//! # Controller Configuration
//!
//! Replication engine and runtime settings loaded from environment variables.

use super::{env_lookup, var_or_default, var_or_default_bool, var_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_REPLICATED_KINDS, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use crate::controller::reconciler::types::ReconcilerError;
use crate::controller::targets::parse_namespace_list;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kinds the controller knows how to replicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicatedKind {
    ConfigMap,
    Secret,
}

impl ReplicatedKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicatedKind::ConfigMap => "ConfigMap",
            ReplicatedKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ReplicatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicatedKind {
    type Err = ReconcilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = s.trim();
        if kind.eq_ignore_ascii_case("ConfigMap") {
            Ok(ReplicatedKind::ConfigMap)
        } else if kind.eq_ignore_ascii_case("Secret") {
            Ok(ReplicatedKind::Secret)
        } else {
            Err(ReconcilerError::UnsupportedKind(kind.to_string()))
        }
    }
}

/// Controller-level configuration
///
/// Passed explicitly to the reconciler and the runtime. All settings have
/// defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorConfig {
    /// Namespaces that never receive replicas
    pub disallowed_namespaces: Vec<String>,
    /// Kinds to run a controller for
    pub replicated_kinds: Vec<ReplicatedKind>,
    /// Delete replicas whose namespace left the target set while the source is active
    pub prune_stale_replicas: bool,
    /// Periodic requeue after a successful reconciliation (seconds, 0 disables)
    pub resync_interval_secs: u64,
    /// Maximum reconciliations in flight per kind
    pub max_concurrent_reconciliations: u16,
    /// Fibonacci backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Fibonacci backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Delay before rebuilding a controller whose stream ended (seconds)
    pub watch_restart_delay_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            disallowed_namespaces: Vec::new(),
            replicated_kinds: vec![ReplicatedKind::ConfigMap, ReplicatedKind::Secret],
            prune_stale_replicas: false,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ReplicatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ReconcilerError> {
        Self::from_lookup(env_lookup)
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Fails only when `REPLICATED_KINDS` names a kind without a binding or
    /// names no kind at all.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReconcilerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kinds_raw = var_or_default_str(&lookup, "REPLICATED_KINDS", DEFAULT_REPLICATED_KINDS);
        let replicated_kinds = parse_kinds(&kinds_raw)?;

        Ok(Self {
            disallowed_namespaces: lookup("DISALLOWED_NAMESPACES")
                .map(|raw| parse_namespace_list(&raw))
                .unwrap_or_default(),
            replicated_kinds,
            prune_stale_replicas: var_or_default_bool(&lookup, "PRUNE_STALE_REPLICAS", false),
            resync_interval_secs: var_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            backoff_start_ms: var_or_default(&lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: var_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "json"),
        })
    }

    /// Requeue delay after success, `None` when resync is disabled
    #[must_use]
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then_some(Duration::from_secs(self.resync_interval_secs))
    }

    #[must_use]
    pub fn is_disallowed(&self, namespace: &str) -> bool {
        self.disallowed_namespaces.iter().any(|d| d == namespace)
    }

    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

fn parse_kinds(raw: &str) -> Result<Vec<ReplicatedKind>, ReconcilerError> {
    let mut kinds = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let kind: ReplicatedKind = entry.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
            "REPLICATED_KINDS must name at least one kind"
        )));
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ReplicatorConfig, ReconcilerError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ReplicatorConfig::from_lookup(|key| map.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = load(&[]).expect("defaults load");
        assert_eq!(config, ReplicatorConfig::default());
        assert_eq!(config.resync_interval(), None);
        assert!(!config.prune_stale_replicas);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = load(&[
            ("DISALLOWED_NAMESPACES", "kube-system, kube-public,,"),
            ("REPLICATED_KINDS", "secret"),
            ("PRUNE_STALE_REPLICAS", "yes"),
            ("RESYNC_INTERVAL_SECS", "300"),
            ("MAX_CONCURRENT_RECONCILIATIONS", "4"),
            ("BACKOFF_START_MS", "500"),
        ])
        .expect("config loads");

        assert_eq!(
            config.disallowed_namespaces,
            vec!["kube-system".to_string(), "kube-public".to_string()]
        );
        assert!(config.is_disallowed("kube-public"));
        assert!(!config.is_disallowed("team-a"));
        assert_eq!(config.replicated_kinds, vec![ReplicatedKind::Secret]);
        assert!(config.prune_stale_replicas);
        assert_eq!(config.resync_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.max_concurrent_reconciliations, 4);
        assert_eq!(config.backoff_start_duration(), Duration::from_millis(500));
        assert_eq!(config.backoff_max_ms, DEFAULT_BACKOFF_MAX_MS);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = load(&[("REPLICATED_KINDS", "ConfigMap,Pod")]).expect_err("Pod has no binding");
        assert!(matches!(err, ReconcilerError::UnsupportedKind(kind) if kind == "Pod"));
    }

    #[test]
    fn test_empty_kind_list_is_rejected() {
        let err = load(&[("REPLICATED_KINDS", " , ")]).expect_err("no kinds");
        assert!(matches!(err, ReconcilerError::ReconciliationFailed(_)));
    }

    #[test]
    fn test_duplicate_kinds_are_collapsed() {
        let config = load(&[("REPLICATED_KINDS", "ConfigMap,configmap,Secret")]).expect("loads");
        assert_eq!(
            config.replicated_kinds,
            vec![ReplicatedKind::ConfigMap, ReplicatedKind::Secret]
        );
    }
}
