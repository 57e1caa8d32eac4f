//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and signal handling.

use crate::config::{ReplicatorConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::runtime::shutdown::{self, Shutdown};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Replication settings
    pub config: Arc<ReplicatorConfig>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Resolves once a termination signal arrives
    pub shutdown: Shutdown,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_ready", &self.server_state.ready())
            .field("shutdown", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Configuration loading
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Signal handling
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let config = ReplicatorConfig::from_env().context("Failed to load replicator configuration")?;
    let server_config = ServerConfig::from_env();

    observability::logging::init_tracing(&config.log_level, &config.log_format)
        .context("Failed to initialize tracing")?;

    info!("Starting Namespace Replicator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());

    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (trigger, shutdown) = shutdown::channel();
    shutdown::listen_for_signals(trigger, Arc::clone(&server_state));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        config: Arc::new(config),
        server_state,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
pub async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
