//! Wiring of the local collaborators into a served NodeManager.

use crate::collab::{CommandDaemonController, HostStatusCollector, JsonConfigStore, TrafficLedger};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::facade::NodeFacade;
use crate::server::NodeManagerService;
use relaynode_proto::node_manager_server::NodeManagerServer;
use std::future::Future;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

/// Build a facade over the store, daemon and host collectors described by `config`.
pub fn local_facade(config: &AgentConfig) -> Result<NodeFacade> {
    let store = JsonConfigStore::new(&config.store.path);
    let daemon = CommandDaemonController::new(
        config.daemon.restart_command.clone(),
        &config.daemon.process_name,
        &config.store.path,
        config.daemon.reload_timeout(),
    )?;
    let status = HostStatusCollector::new(TrafficLedger::new(&config.status.traffic_ledger))
        .with_disk_mount(&config.status.disk_mount)
        .with_daemon(&config.daemon.process_name, config.daemon.binary.clone());

    Ok(NodeFacade::new(
        Arc::new(store),
        Arc::new(daemon),
        Arc::new(status),
    ))
}

/// Serve the NodeManager service until `shutdown` resolves.
pub async fn serve(config: &AgentConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    let addr = config.listen_addr()?;
    let service = NodeManagerService::new(local_facade(config)?);

    info!("Starting gRPC server on {}", addr);

    Server::builder()
        .add_service(NodeManagerServer::new(service))
        .serve_with_shutdown(addr, shutdown)
        .await?;

    info!("gRPC server stopped");
    Ok(())
}
