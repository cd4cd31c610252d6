//! gRPC server implementation for the node agent.
//!
//! This module implements the NodeManager service: it decodes protobuf
//! requests, hands them to the `NodeFacade` and encodes the resulting
//! envelopes. Caller errors become `INVALID_ARGUMENT` statuses; collaborator
//! failures are returned as ordinary responses with `success = false`.

use crate::context::CallContext;
use crate::error::RequestError;
use crate::facade::NodeFacade;
use crate::model::{NetworkStats, NodeConfigUpdate, SystemLoad, TrafficStats, UserSyncRecord};
use relaynode_proto::node_manager_server::NodeManager;
use relaynode_proto::{
    self as pb, GetNodeStatusRequest, GetNodeStatusResponse, GetSystemStatsRequest,
    GetSystemStatsResponse, GetUserTrafficRequest, GetUserTrafficResponse, SyncUsersRequest,
    SyncUsersResponse, UpdateNodeConfigRequest, UpdateNodeConfigResponse,
};
use tonic::{Request, Response, Status};
use tracing::debug;

/// Implementation of the NodeManager gRPC interface.
#[derive(Clone)]
pub struct NodeManagerService {
    facade: NodeFacade,
}

impl NodeManagerService {
    pub fn new(facade: NodeFacade) -> Self {
        Self { facade }
    }
}

impl From<pb::User> for UserSyncRecord {
    fn from(user: pb::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            uuid: user.uuid,
            speed_limit: user.speed_limit,
            enable: user.enable,
        }
    }
}

impl From<pb::NodeConfig> for NodeConfigUpdate {
    fn from(config: pb::NodeConfig) -> Self {
        Self {
            protocol: config.protocol,
            port: config.port,
            settings: config.settings,
        }
    }
}

impl From<SystemLoad> for pb::SystemLoad {
    fn from(load: SystemLoad) -> Self {
        Self {
            cpu_usage: load.cpu_usage,
            memory_usage: load.memory_usage,
            disk_usage: load.disk_usage,
            load_averages: load.load_averages,
        }
    }
}

impl From<NetworkStats> for pb::NetworkStats {
    fn from(stats: NetworkStats) -> Self {
        Self {
            tcp_connections: stats.tcp_connections,
            udp_connections: stats.udp_connections,
            network_io_up: stats.up_per_sec,
            network_io_down: stats.down_per_sec,
        }
    }
}

impl From<TrafficStats> for pb::TrafficStats {
    fn from(stats: TrafficStats) -> Self {
        Self {
            up_traffic: stats.up,
            down_traffic: stats.down,
        }
    }
}

#[tonic::async_trait]
impl NodeManager for NodeManagerService {
    async fn sync_users(
        &self,
        request: Request<SyncUsersRequest>,
    ) -> Result<Response<SyncUsersResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let users: Vec<UserSyncRecord> = request
            .into_inner()
            .users
            .into_iter()
            .map(UserSyncRecord::from)
            .collect();

        debug!("SyncUsers with {} users", users.len());

        let (success, message, _) = self.facade.sync_users(&ctx, &users).await?.into_parts();
        Ok(Response::new(SyncUsersResponse { success, message }))
    }

    async fn get_node_status(
        &self,
        request: Request<GetNodeStatusRequest>,
    ) -> Result<Response<GetNodeStatusResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());

        let (success, message, status) = self.facade.get_node_status(&ctx).await?.into_parts();
        let response = match status {
            Some(status) => GetNodeStatusResponse {
                success,
                message,
                system_load: Some(status.load.into()),
                daemon_version: status.daemon_version,
                daemon_state: status.daemon_state,
            },
            None => GetNodeStatusResponse {
                success,
                message,
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    async fn get_system_stats(
        &self,
        request: Request<GetSystemStatsRequest>,
    ) -> Result<Response<GetSystemStatsResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());

        let (success, message, stats) = self.facade.get_system_stats(&ctx).await?.into_parts();
        let response = match stats {
            Some(stats) => GetSystemStatsResponse {
                success,
                message,
                system_load: Some(stats.load.into()),
                network_stats: Some(stats.network.into()),
                uptime: stats.uptime,
            },
            None => GetSystemStatsResponse {
                success,
                message,
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    async fn update_node_config(
        &self,
        request: Request<UpdateNodeConfigRequest>,
    ) -> Result<Response<UpdateNodeConfigResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let config: NodeConfigUpdate = request
            .into_inner()
            .config
            .ok_or(RequestError::MissingField("config"))?
            .into();

        let (success, message, _) = self
            .facade
            .update_node_config(&ctx, &config)
            .await?
            .into_parts();
        Ok(Response::new(UpdateNodeConfigResponse { success, message }))
    }

    async fn get_user_traffic(
        &self,
        request: Request<GetUserTrafficRequest>,
    ) -> Result<Response<GetUserTrafficResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let req = request.into_inner();

        let (success, message, stats) = self
            .facade
            .get_user_traffic(&ctx, req.user_id, req.start_time, req.end_time)
            .await?
            .into_parts();
        Ok(Response::new(GetUserTrafficResponse {
            success,
            message,
            stats: stats.map(Into::into),
        }))
    }
}
