//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::client::Replicable;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::observability;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per source so one failing source never slows
/// down the others. Conflicts retry at the shortest delay, sources of an
/// unsupported kind at the longest, and cancelled runs wait for the next
/// event.
pub fn handle_reconciliation_error<K: Replicable>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let name = obj.meta().name.as_deref().unwrap_or("unknown");
    let namespace = obj.meta().namespace.as_deref().unwrap_or("default");
    let kind = K::kind_name();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        kind = kind.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(&kind, error.reason());

    if matches!(error, ReconcilerError::Cancelled) {
        debug!("Reconciliation of {}/{} cancelled by shutdown", namespace, name);
        return Action::await_change();
    }

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);

    let config = ctx.config();
    let resource_key = Reconciler::<K>::backoff_key(namespace, name);
    let (delay, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key)
                .or_insert_with(|| BackoffState::new(config.backoff_start_ms, config.backoff_max_ms));
            state.increment_error();
            let next = state.backoff.next_backoff();
            let delay = match error {
                ReconcilerError::Conflict { .. } => state.backoff.min_backoff(),
                ReconcilerError::UnsupportedKind(_) => state.backoff.max_backoff(),
                _ => next,
            };
            (delay, state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
            (config.backoff_max_duration(), 0)
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));

    info!(
        "🔄 Retrying with Fibonacci backoff: {}ms (error count: {}, reason: {})",
        delay.as_millis(),
        error_count,
        error.reason()
    );
    info!(
        "📅 Next retry scheduled: {} (in {}ms)",
        next_trigger_time.to_rfc3339(),
        delay.as_millis()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Broad class of a watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401: credentials or RBAC revoked
    Unauthorized,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: the watched kind or object is gone
    NotFound,
    Other,
}

/// Classify a watch error from its rendered message
///
/// 404 is checked before 401: a plain-text 404 body fails to deserialize and
/// the resulting message mentions `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 = error_string.contains("401") || error_string.contains("Unauthorized");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_not_found {
        WatchErrorClass::NotFound
    } else if is_401 {
        WatchErrorClass::Unauthorized
    } else if is_410 {
        WatchErrorClass::Expired
    } else if is_429 {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Log a watcher error at a level matching its class
///
/// The watchers run with kube's default backoff, so nothing here sleeps or
/// restarts; the stream recovers on its own.
pub fn handle_watch_stream_error(kind: &str, stream: &str, error: &watcher::Error) {
    let error_string = format!("{error:?}");
    match classify_watch_error(&error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                kind,
                stream,
                "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("🔍 Verify the ClusterRole grants list/watch on {} and namespaces", kind);
        }
        WatchErrorClass::Expired => {
            warn!(
                kind,
                stream,
                error_type = "410",
                "Watch resource version expired (410), watcher will relist"
            );
        }
        WatchErrorClass::Throttled => {
            warn!(
                kind,
                stream,
                error_type = "429",
                "API server throttling watch (429), backing off"
            );
        }
        WatchErrorClass::NotFound => {
            warn!(kind, stream, "Watched resource not found (404): {}", error_string);
        }
        WatchErrorClass::Other => {
            error!(kind, stream, "Watch stream error: {}", error_string);
        }
    }
}

/// Log an error surfaced by the controller's output stream
///
/// Reconciler failures were already handled by [`handle_reconciliation_error`];
/// requests for sources missing from the cache are expected after deletes.
pub fn handle_controller_error<K: Replicable>(
    error: &controller::Error<ReconcilerError, watcher::Error>,
) {
    let kind = K::kind_name();
    match error {
        controller::Error::ObjectNotFound(obj_ref) => {
            debug!(
                kind = kind.as_str(),
                "Request for {} dropped, source is not cached (likely deleted)",
                obj_ref
            );
        }
        controller::Error::ReconcilerFailed(e, obj_ref) => {
            debug!(kind = kind.as_str(), error = %e, "Reconcile of {} failed", obj_ref);
        }
        controller::Error::QueueError(e) => handle_watch_stream_error(&kind, "source", e),
        other => error!(kind = kind.as_str(), "Controller stream error: {:?}", other),
    }
}

/// Requeue reason label for a successful outcome's delay
#[must_use]
pub fn requeue_reason(delay: Duration, finalizer_delay: Duration) -> &'static str {
    if delay == finalizer_delay {
        "finalizer-added"
    } else {
        "resync"
    }
}
