//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Metadata keys written to or read from cluster objects live here so the
//! event mappers, the projection and the reconciler agree on one spelling.
//! Defaults can be overridden via environment variables where applicable.

/// Annotation enabling replication of a source object (value must be `"true"`)
pub const REPLICATION_ALLOWED_ANNOTATION: &str = "replication.octopilot.io/replication-allowed";

/// Annotation listing explicit target namespaces (comma-separated)
pub const DESIRED_NAMESPACES_ANNOTATION: &str = "replication.octopilot.io/desired-namespaces";

/// Annotation recording the source resource version at the last projection
pub const SOURCE_VERSION_ANNOTATION: &str = "replication.octopilot.io/source-version";

/// Provenance label naming the namespace of the source object
pub const SOURCE_NAMESPACE_LABEL: &str = "replication.octopilot.io/source-namespace";

/// Provenance label naming the source object
pub const SOURCE_NAME_LABEL: &str = "replication.octopilot.io/source-name";

/// Finalizer blocking source deletion until all replicas are gone
pub const SOURCE_FINALIZER: &str = "replication.octopilot.io/source";

/// Value the replication annotation must carry
pub const REPLICATION_ALLOWED_VALUE: &str = "true";

/// Name of the secondary index over replicable sources
pub const REPLICATION_INDEX_FIELD: &str = "replication.enabled";

/// Field manager used for writes issued by the controller
pub const FIELD_MANAGER: &str = "namespace-replicator";

/// Namespace phase that admits new replicas
pub const NAMESPACE_PHASE_ACTIVE: &str = "Active";

/// Namespace phase of a namespace pending deletion
pub const NAMESPACE_PHASE_TERMINATING: &str = "Terminating";

/// Requeue delay after the finalizer was added (milliseconds)
pub const FINALIZER_REQUEUE_MS: u64 = 1000;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default Fibonacci backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default Fibonacci backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before rebuilding a controller whose stream ended (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default number of reconciliations allowed in flight at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default periodic resync interval after success (0 disables resync)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 0;

/// Kinds replicated when `REPLICATED_KINDS` is not set
pub const DEFAULT_REPLICATED_KINDS: &str = "ConfigMap,Secret";
