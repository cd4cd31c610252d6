//! relaynode agent - remote management endpoint for a proxy node.
//!
//! Serves the NodeManager gRPC service so a fleet controller can push users
//! and inbound settings and read host and daemon telemetry.

use anyhow::{Context, Result};
use clap::Parser;
use relaynode::{agent, logging, AgentConfig};
use std::path::PathBuf;
use tracing::{info, warn};

/// relaynode agent - remote management endpoint for a proxy node.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "RELAYNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AgentConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    config.validate().context("Invalid configuration")?;

    logging::init_logging(&config.log, args.debug).context("Failed to initialize logging")?;

    info!("relaynode agent v{}", env!("CARGO_PKG_VERSION"));
    if args.config.is_none() {
        warn!("No configuration file given, using defaults");
    }
    info!("Inbound store: {}", config.store.path.display());
    info!("Restart command: {:?}", config.daemon.restart_command);

    agent::serve(&config, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
