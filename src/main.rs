//! # Namespace Replicator
//!
//! Kubernetes controller that replicates annotated ConfigMaps and Secrets into
//! other namespaces.
//!
//! A source opts in with `replication.octopilot.io/replication-allowed: "true"`
//! and optionally narrows its targets with
//! `replication.octopilot.io/desired-namespaces: "ns-a,ns-b"`. Replicas carry
//! provenance labels pointing back at their source and are removed when the
//! source is deleted or stops replicating.

use anyhow::Result;
use namespace_replicator::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run(init.client, init.config, init.server_state, init.shutdown).await
}
