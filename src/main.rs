//! peca-proxy
//!
//! HTTP relay proxy in front of a PeerCast node.
//!
//! This service:
//! - Accepts client HTTP connections on a configurable address
//! - Validates stream requests against the node's live channel list
//! - Relays upstream stream bytes to the client with a stall timeout
//! - Serves a plain-text stats placeholder at `/stats`

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use peca_proxy::config::Config;
use peca_proxy::proxy::Listener;
use peca_proxy::upstream::PeercastClient;

/// HTTP relay proxy in front of a PeerCast node.
#[derive(Debug, Parser)]
#[command(name = "peca-proxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to accept client connections on.
    #[arg(long, env = "PECA_PROXY_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to accept client connections on.
    #[arg(long, env = "PECA_PROXY_PORT", default_value_t = 8888)]
    port: u16,

    /// Hostname of the PeerCast node.
    #[arg(long, env = "PECA_PROXY_PEERCAST_HOST", default_value = "localhost")]
    peercast_host: String,

    /// Port of the PeerCast node (control API and stream data).
    #[arg(long, env = "PECA_PROXY_PEERCAST_PORT", default_value_t = 7144)]
    peercast_port: u16,

    /// Stall timeout for upstream reads, in seconds.
    #[arg(long, default_value_t = 5)]
    stall_timeout: u64,

    /// Enable debug logging (RUST_LOG still takes precedence).
    #[arg(short = 'd', long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::new(
        SocketAddr::new(cli.host, cli.port),
        cli.peercast_host,
        cli.peercast_port,
    );
    config.stall_timeout = Duration::from_secs(cli.stall_timeout);

    info!("Starting peca-proxy");
    info!(
        listen_addr = %config.listen_addr,
        upstream_host = %config.upstream_host,
        upstream_port = config.upstream_port,
        "Configuration loaded"
    );

    let pecast = Arc::new(
        PeercastClient::new(
            &config.upstream_host,
            config.upstream_port,
            config.connect_timeout,
        )
        .context("Failed to build upstream client")?,
    );

    // Log the node's version, as a reachability check. The proxy still
    // starts if the node is down; sessions degrade to 400 until it is back.
    match pecast.version_info().await {
        Ok(version) => info!(
            agent_name = %version.agent_name,
            api_version = %version.api_version,
            "PeerCast node reachable"
        ),
        Err(e) => warn!(error = %e, "PeerCast node not reachable at startup"),
    }

    let listener = Listener::bind(config, pecast)
        .await
        .context("Failed to bind listener")?;
    let listener = Arc::new(listener);

    if let Err(e) = listener.run().await {
        error!(error = %e, "Listener error");
        return Err(e.into());
    }

    Ok(())
}
