//! vactor-node - standalone cluster node daemon.
//!
//! Boots one vactor node from a TOML configuration file: binds the TCP
//! transport, starts the bundled persister, assembles the runtime, registers
//! the demo `counter` behaviour, and runs until Ctrl+C.
//!
//! Usage:
//!   vactor-node --config vactor.toml
//!   vactor-node --listen 127.0.0.1:7371 --peer 127.0.0.1:7370

mod counter;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vactor_config::{NodeConfig, PersistProvider};
use vactor_network::{TcpTransport, Transport};
use vactor_persistence::{DiskStore, MemoryStore, Persister};
use vactor_runtime::{ActorNode, NodeOptions};

#[derive(Parser, Debug)]
#[command(name = "vactor-node", about = "vactor cluster node daemon", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides the configured listen address.
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Adds a seed peer; may be given multiple times.
    #[arg(long = "peer", value_name = "ADDR")]
    peers: Vec<SocketAddr>,

    /// Routes sends without hosting any actors.
    #[arg(long)]
    client_only: bool,
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.network.listen = listen;
    }
    config.network.peers.extend(cli.peers.iter().copied());
    if cli.client_only {
        config.node.client_only = true;
    }
    Ok(config)
}

fn build_persister(config: &NodeConfig) -> Result<Arc<dyn Persister>> {
    Ok(match config.persist.provider {
        PersistProvider::Memory => match config.persist.capacity {
            Some(capacity) => Arc::new(MemoryStore::bounded(capacity)),
            None => Arc::new(MemoryStore::new()),
        },
        PersistProvider::Disk => Arc::new(
            DiskStore::open(&config.persist.path).with_context(|| {
                format!("opening disk store at {}", config.persist.path.display())
            })?,
        ),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let transport = TcpTransport::bind(config.network.listen, &config.network.peers)
        .await
        .context("binding cluster transport")?;
    info!(node = %transport.local_node(), "transport bound");

    let persister = if config.node.client_only {
        None
    } else {
        Some(build_persister(&config)?)
    };

    let node = ActorNode::start(
        transport,
        persister,
        NodeOptions {
            client_only: config.node.client_only,
            default_time_to_live: config.runtime.default_time_to_live(),
            low_memory_watermark: config.runtime.low_memory_watermark,
            memory_probe: None,
        },
    )?;
    node.register(Arc::new(counter::Counter));

    info!(node = %node.local_node(), "vactor node running, Ctrl+C to stop");
    signal::ctrl_c().await.context("waiting for Ctrl+C")?;

    node.shutdown();
    info!(node = %node.local_node(), "bye");
    Ok(())
}
