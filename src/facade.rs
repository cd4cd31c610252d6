/*!
 * Node control facade
 *
 * Stateless orchestration of the five remote operations over the config
 * store, daemon controller and status collector. Each call:
 *
 * 1. validates its input (`RequestError`, nothing else is touched)
 * 2. runs its collaborator steps strictly in sequence
 * 3. stops at the first collaborator failure and folds it into a
 *    `success = false` envelope
 *
 * No retries, no timeouts of its own and no rollback: records applied before
 * a failing one stay applied.
 */

use crate::collab::{ConfigStore, DaemonController, StatusCollector};
use crate::context::CallContext;
use crate::error::{NodeError, RequestError};
use crate::model::{
    Envelope, InboundRecord, NetworkStats, NodeConfigUpdate, NodeStatus, SystemLoad, SystemStats,
    TimeWindow, TrafficStats, UserSyncRecord,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const USERS_SYNCED: &str = "Users synced successfully";
pub const NODE_CONFIG_UPDATED: &str = "Node config updated successfully";

/// Outcome of a facade call: a caller error, or an envelope.
pub type CallResult<T> = Result<Envelope<T>, RequestError>;

#[derive(Clone)]
pub struct NodeFacade {
    store: Arc<dyn ConfigStore>,
    daemon: Arc<dyn DaemonController>,
    status: Arc<dyn StatusCollector>,
}

impl NodeFacade {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        daemon: Arc<dyn DaemonController>,
        status: Arc<dyn StatusCollector>,
    ) -> Self {
        Self {
            store,
            daemon,
            status,
        }
    }

    /// Upsert every user in order, then reload the daemon once.
    pub async fn sync_users(&self, ctx: &CallContext, users: &[UserSyncRecord]) -> CallResult<()> {
        for user in users {
            user.validate()?;
        }

        let outcome = async {
            self.upsert_all(ctx, users.iter().map(InboundRecord::from))
                .await?;
            self.daemon.reload(ctx, false).await
        }
        .await;

        Ok(render("sync users", outcome, |()| {
            info!("Synced {} users", users.len());
            Envelope::succeeded((), USERS_SYNCED)
        }))
    }

    pub async fn get_node_status(&self, ctx: &CallContext) -> CallResult<NodeStatus> {
        let outcome = async {
            let snapshot = self.status.snapshot(ctx).await?;
            Ok::<_, NodeError>(NodeStatus {
                load: SystemLoad::derive(&snapshot)?,
                daemon_version: snapshot.daemon.version,
                daemon_state: snapshot.daemon.state.to_string(),
            })
        }
        .await;

        Ok(render("get node status", outcome, |status| {
            Envelope::succeeded(status, "")
        }))
    }

    pub async fn get_system_stats(&self, ctx: &CallContext) -> CallResult<SystemStats> {
        let outcome = async {
            let snapshot = self.status.snapshot(ctx).await?;
            Ok::<_, NodeError>(SystemStats {
                load: SystemLoad::derive(&snapshot)?,
                network: NetworkStats {
                    tcp_connections: snapshot.tcp_count,
                    udp_connections: snapshot.udp_count,
                    up_per_sec: snapshot.net_io.up,
                    down_per_sec: snapshot.net_io.down,
                },
                uptime: snapshot.uptime,
            })
        }
        .await;

        Ok(render("get system stats", outcome, |stats| {
            Envelope::succeeded(stats, "")
        }))
    }

    /// Upsert a single inbound definition, then reload the daemon.
    pub async fn update_node_config(
        &self,
        ctx: &CallContext,
        config: &NodeConfigUpdate,
    ) -> CallResult<()> {
        config.validate()?;

        let outcome = async {
            self.store.upsert(ctx, InboundRecord::from(config)).await?;
            self.daemon.reload(ctx, false).await
        }
        .await;

        Ok(render("update node config", outcome, |()| {
            info!("Applied {} inbound on port {}", config.protocol, config.port);
            Envelope::succeeded((), NODE_CONFIG_UPDATED)
        }))
    }

    pub async fn get_user_traffic(
        &self,
        ctx: &CallContext,
        user_id: i64,
        start_time: i64,
        end_time: i64,
    ) -> CallResult<TrafficStats> {
        let window = TimeWindow::from_unix(start_time, end_time)?;

        let outcome = self.status.user_traffic(ctx, user_id, window).await;

        Ok(render("get user traffic", outcome, |stats| {
            debug!("User {} traffic: up={} down={}", user_id, stats.up, stats.down);
            Envelope::succeeded(stats, "")
        }))
    }

    /// Left-to-right fold over the records, stopping at the first failure.
    async fn upsert_all(
        &self,
        ctx: &CallContext,
        records: impl Iterator<Item = InboundRecord>,
    ) -> Result<(), NodeError> {
        for (index, record) in records.enumerate() {
            let key = record.key();
            self.store
                .upsert(ctx, record)
                .await
                .map_err(|source| NodeError::Record {
                    index,
                    key,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }
}

/// Fold a collaborator outcome into an envelope.
fn render<T, U>(
    action: &str,
    outcome: Result<T, NodeError>,
    on_success: impl FnOnce(T) -> Envelope<U>,
) -> Envelope<U> {
    match outcome {
        Ok(value) => on_success(value),
        Err(e) => {
            warn!("Failed to {}: {}", action, e);
            Envelope::failed(format!("Failed to {}: {}", action, e))
        }
    }
}
