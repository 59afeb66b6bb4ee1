//! Runs one routing node over UDP.
//!
//! ```text
//! kad-node [config.toml]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kad_routing::{
    ConfigProvider, KadNode, NodeDependencies, TokioScheduler, TomlConfigProvider, Transport,
    UdpTransport,
};

const DEFAULT_CONFIG_PATH: &str = "kad.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let provider = TomlConfigProvider::load(&path)
        .with_context(|| format!("loading configuration from {path}"))?;
    let node_config = provider.node_config();

    let transport: Arc<dyn Transport> = UdpTransport::bind(node_config.local_addr)
        .await
        .context("binding udp transport")?;
    let scheduler = Arc::new(TokioScheduler::new(Handle::current()));
    let deps = NodeDependencies::new(transport, scheduler);

    let node = KadNode::start(node_config, provider.routing_config(), deps).await?;
    match node.join().await {
        Ok(()) => info!(node = %node.id().short_hex(), "joined"),
        Err(e) => warn!(error = %e, "join failed, rejoin timer keeps retrying"),
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    node.stop();
    Ok(())
}
