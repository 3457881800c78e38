//! traQ Node - chat server entry point.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use traq_node::config::Config;
use traq_node::node::Node;
use traq_node::observability::{init_logging, LogFormat};
use traq_repository::MemoryRepository;

/// traQ Node - chat server with realtime notifications, OAuth2 and bots
#[derive(Parser, Debug)]
#[command(name = "traq-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Public origin of the server
    #[arg(long)]
    origin: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Run in development mode
    #[arg(long)]
    dev: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(origin) = self.origin {
            config.origin = origin;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if self.dev {
            config.dev_mode = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting traQ node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        origin = %config.origin,
        dev_mode = config.dev_mode,
        "Node configuration"
    );
    config.log_external_providers();

    let shutdown = CancellationToken::new();
    let node = Node::start(&config, Arc::new(MemoryRepository::new()), shutdown.clone())
        .context("failed to start node")?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "Node is ready. Press Ctrl+C to stop.");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    });

    let server_shutdown = shutdown.clone();
    axum::serve(listener, node.router())
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("server error")?;

    node.stop().await;
    Ok(())
}
