//! # Shutdown
//!
//! Process-wide cancellation signal shared by every controller and every
//! in-flight reconciliation.

use crate::controller::server::ServerState;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Fires the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cloneable receiver side of the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger and signal
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Signal shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been signalled
    ///
    /// Never resolves if the trigger is dropped without firing.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Owned variant of [`Shutdown::wait`] for APIs that need a `'static` future
    pub async fn wait_owned(self) {
        self.wait().await;
    }
}

/// Fire the trigger on SIGINT or SIGTERM and mark the server not ready
pub fn listen_for_signals(trigger: ShutdownTrigger, server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        server_state.set_ready(false);
        trigger.trigger();
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler, listening for SIGINT only: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
