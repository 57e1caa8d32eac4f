//! # Watch Loop
//!
//! Assembles one `kube_runtime::Controller` per replicated kind and keeps it
//! running until shutdown.
//!
//! Each controller is fed by three streams sharing a single scheduler, so
//! duplicate requests for a source coalesce no matter which stream produced
//! them:
//!
//! - the source watch (`for_stream`), also feeding the reflector store
//! - the replica watch (`reconcile_on`), mapped through provenance labels
//! - the namespace watch (`reconcile_on`), fanned out through the source index

use crate::config::{ReplicatedKind, ReplicatorConfig};
use crate::constants::FINALIZER_REQUEUE_MS;
use crate::controller::client::{KubeClusterClient, NamespaceClient, ObjectClient, Replicable};
use crate::controller::events::mapper::record;
use crate::controller::events::{
    classified, namespace_requests, replica_request, source_admits, SourceIndex,
};
use crate::controller::reconciler::{EventStream, ReconcileOutcome, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::observability;
use crate::runtime::error_policy::{
    handle_controller_error, handle_reconciliation_error, handle_watch_stream_error,
    requeue_reason,
};
use crate::runtime::shutdown::Shutdown;
use futures::future::{self, BoxFuture};
use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{self, Action};
use kube_runtime::{reflector, watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Run one controller per configured kind until shutdown
pub async fn run(
    client: Client,
    config: Arc<ReplicatorConfig>,
    server_state: Arc<ServerState>,
    shutdown: Shutdown,
) -> Result<(), anyhow::Error> {
    info!(
        kinds = ?config.replicated_kinds,
        disallowed = ?config.disallowed_namespaces,
        prune = config.prune_stale_replicas,
        "Starting controller watch loop..."
    );

    let controllers: Vec<BoxFuture<'static, ()>> = config
        .replicated_kinds
        .iter()
        .map(|kind| match kind {
            ReplicatedKind::ConfigMap => run_controller::<ConfigMap>(
                client.clone(),
                Arc::clone(&config),
                shutdown.clone(),
            )
            .boxed(),
            ReplicatedKind::Secret => {
                run_controller::<Secret>(client.clone(), Arc::clone(&config), shutdown.clone())
                    .boxed()
            }
        })
        .collect();

    future::join_all(controllers).await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

/// Run the controller for kind `K`, rebuilding it whenever its stream ends
pub async fn run_controller<K: Replicable>(
    client: Client,
    config: Arc<ReplicatorConfig>,
    shutdown: Shutdown,
) {
    let kind = K::kind_name();
    let cluster = Arc::new(KubeClusterClient::new(client.clone()));
    let objects = Arc::clone(&cluster) as Arc<dyn ObjectClient<K>>;
    let namespaces = cluster as Arc<dyn NamespaceClient>;
    let reconciler = Arc::new(Reconciler::<K>::new(objects, namespaces, Arc::clone(&config)));

    loop {
        if shutdown.is_triggered() {
            info!(kind = kind.as_str(), "Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            kind = kind.as_str()
        );
        info!(kind = kind.as_str(), "Starting controller");
        controller_future(
            client.clone(),
            config.max_concurrent_reconciliations,
            Arc::clone(&reconciler),
            shutdown.clone(),
        )
        .instrument(watch_span)
        .await;

        if shutdown.is_triggered() {
            info!(kind = kind.as_str(), "Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_duration();
        warn!(
            "Controller watch stream for {} ended, restarting in {} seconds...",
            kind,
            delay.as_secs()
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.wait() => {}
        }
    }
}

/// Build the controller for kind `K` and drive it to completion
fn controller_future<K: Replicable>(
    client: Client,
    concurrency: u16,
    reconciler: Arc<Reconciler<K>>,
    shutdown: Shutdown,
) -> impl std::future::Future<Output = ()> + Send {
    let kind = K::kind_name();
    let (reader, writer) = reflector::store::<K>();
    let index = SourceIndex::new(reader.clone());

    let source_kind = kind.clone();
    let sources = classified(
        watcher(Api::<K>::all(client.clone()), watcher::Config::default())
            .default_backoff()
            .reflect(writer),
    )
    .try_filter(|event| future::ready(source_admits(event)))
    .map_ok(move |event| {
        record(&source_kind, EventStream::Source);
        event.into_object()
    });

    let replica_kind = kind.clone();
    let replicas = classified(
        watcher(Api::<K>::all(client.clone()), watcher::Config::default()).default_backoff(),
    )
    .filter_map(move |event| {
        future::ready(match event {
            Ok(event) => replica_request(&event),
            Err(e) => {
                handle_watch_stream_error(&replica_kind, EventStream::Replica.as_str(), &e);
                None
            }
        })
    });

    let namespace_kind = kind.clone();
    let namespaces = classified(
        watcher(Api::<Namespace>::all(client), watcher::Config::default()).default_backoff(),
    )
    .map(move |event| {
        let requests = match event {
            Ok(event) => namespace_requests(&event, &index),
            Err(e) => {
                handle_watch_stream_error(&namespace_kind, EventStream::Namespace.as_str(), &e);
                Vec::new()
            }
        };
        stream::iter(requests)
    })
    .flatten();

    let reconcile_shutdown = shutdown.clone();
    Controller::for_stream(sources, reader)
        .reconcile_on(replicas)
        .reconcile_on(namespaces)
        .with_config(controller::Config::default().concurrency(concurrency))
        .graceful_shutdown_on(shutdown.wait_owned())
        .run(
            move |obj, ctx| reconcile_object(obj, ctx, reconcile_shutdown.clone()),
            handle_reconciliation_error::<K>,
            reconciler,
        )
        .for_each(|result| {
            match result {
                Ok((obj_ref, action)) => {
                    debug!(action = ?action, "watch.event.reconciled {}", obj_ref);
                }
                Err(e) => handle_controller_error::<K>(&e),
            }
            future::ready(())
        })
}

/// Reconcile one source, racing the work against shutdown
///
/// The source is re-read inside the reconciler, so the cached `obj` only
/// provides its identity.
async fn reconcile_object<K: Replicable>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
    shutdown: Shutdown,
) -> Result<Action, ReconcilerError> {
    let name = obj.meta().name.clone().unwrap_or_default();
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let kind = K::kind_name();

    let reconcile_span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.version = obj.meta().resource_version.as_deref().unwrap_or("unknown"),
        kind = kind.as_str()
    );

    async move {
        let result = tokio::select! {
            result = ctx.reconcile(&namespace, &name) => result,
            () = shutdown.wait() => Err(ReconcilerError::Cancelled),
        };

        match result {
            Ok(ReconcileOutcome::Done) => {
                debug!("watch.event.reconciled");
                Ok(Action::await_change())
            }
            Ok(ReconcileOutcome::Requeue(delay)) => {
                let reason =
                    requeue_reason(delay, Duration::from_millis(FINALIZER_REQUEUE_MS));
                observability::metrics::increment_requeues_total(reason);
                debug!(requeue_ms = delay.as_millis(), reason, "watch.event.requeued");
                Ok(Action::requeue(delay))
            }
            Err(e) => {
                error!(error = %e, "watch.event.reconciliation_failed");
                Err(e)
            }
        }
    }
    .instrument(reconcile_span)
    .await
}
