//! kad-daemon: a standalone DHT peer process.
//!
//! Single OS process running a Tokio runtime, binding one TCP socket for
//! inbound RPCs and bootstrapping against an optional seed peer.

mod config;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use kad_id::Id;
use kad_node::{DhtNode, NodeConfig};
use kad_table::Peer;

use crate::config::DaemonConfig;

/// CLI flags. Anything left unset falls back to the config file, and
/// anything left unset there falls back to the built-in default.
#[derive(Debug, Parser)]
#[command(name = "kad-daemon", about = "A Kademlia-style DHT peer")]
struct Cli {
    /// Path to a TOML config file. Defaults to `$KAD_DATA_DIR/config.toml`.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the bind address, e.g. `0.0.0.0:4000`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the bootstrap contact, `host:port`.
    #[arg(long)]
    bootstrap_addr: Option<String>,

    /// Override the bootstrap contact's id, hex-encoded.
    #[arg(long)]
    bootstrap_id: Option<String>,

    /// Hex-encoded node id. Random if unset, matching the reference
    /// implementation's lack of persisted identity.
    #[arg(long)]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(DaemonConfig::default_path);
    let mut config = DaemonConfig::load(&config_path)?;

    if let Some(addr) = cli.bootstrap_addr {
        config.network.bootstrap_addr = addr;
    }
    if let Some(id) = cli.bootstrap_id {
        config.network.bootstrap_id = id;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("kad-daemon starting");

    let self_id = match cli.node_id {
        Some(hex_id) => Id::from_hex(&hex_id)?,
        None => Id::random(),
    };
    info!(node_id = %self_id.to_hex(), "node identity");

    let bind_addr: SocketAddr = match cli.bind {
        Some(addr) => addr,
        None => format!("{}:{}", config.network.bind_host, config.network.bind_port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind_host/bind_port in config: {e}"))?,
    };

    let bootstrap_peer = if config.network.bootstrap_addr.is_empty() {
        None
    } else {
        let (host, port) = config
            .network
            .bootstrap_addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("bootstrap_addr must be host:port"))?;
        let port: u16 = port.parse()?;
        let id = Id::from_hex(&config.network.bootstrap_id)?;
        Some(Peer::new(id, host, port))
    };

    let node_config = NodeConfig {
        alpha: config.tuning.alpha,
        call_timeout: Duration::from_millis(config.tuning.call_timeout_ms),
        poll_tick: Duration::from_millis(config.tuning.poll_tick_ms),
    };

    let node = DhtNode::bind(self_id, bind_addr, bootstrap_peer.clone(), node_config).await?;
    info!(addr = %node.self_peer().host, port = node.self_peer().port, "listening");

    if bootstrap_peer.is_some() {
        let discovered = node.bootstrap().await;
        info!(count = discovered.len(), "bootstrap complete");
    } else {
        warn!("no bootstrap peer configured; starting a fresh network");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let serve = node.serve(shutdown_rx);

    tokio::select! {
        _ = serve => {
            error!("serve loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    let _ = shutdown_tx.send(());
    info!("kad-daemon stopped");
    Ok(())
}
