//! Collaborator contracts consumed by the node facade
//!
//! The facade holds no state of its own and never locks around these calls.
//! Implementations must be safe to call concurrently from independent RPCs
//! and must not assume they are the only writer.
//!
//! Concrete implementations:
//! - `JsonConfigStore`: inbound definitions persisted as a JSON document
//! - `CommandDaemonController`: applies configuration by running a restart command
//! - `HostStatusCollector`: host metrics via `sysinfo` plus a traffic ledger
//! - `mock`: recording test doubles (tests only)

mod daemon;
mod status;
mod store;

#[cfg(test)]
pub mod mock;

pub use daemon::CommandDaemonController;
pub use status::{HostStatusCollector, TrafficLedger, TrafficSample};
pub use store::JsonConfigStore;

use crate::context::CallContext;
use crate::error::Result;
use crate::model::{InboundRecord, StatusSnapshot, TimeWindow, TrafficStats};
use async_trait::async_trait;

/// Persistence of inbound connection definitions.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Create or replace the record stored under `record.key()`.
    ///
    /// Repeating an identical upsert must leave the store unchanged.
    async fn upsert(&self, ctx: &CallContext, record: InboundRecord) -> Result<()>;
}

/// Lifecycle control of the forwarding daemon.
#[async_trait]
pub trait DaemonController: Send + Sync {
    /// Apply the currently persisted configuration to the running daemon.
    ///
    /// With `force == false` the controller may keep live connections or skip
    /// the restart entirely when nothing changed. Timeouts and retries are
    /// the controller's business.
    async fn reload(&self, ctx: &CallContext, force: bool) -> Result<()>;
}

/// Source of host and daemon telemetry.
#[async_trait]
pub trait StatusCollector: Send + Sync {
    /// Fresh metrics. Implementations must not serve a cached snapshot.
    async fn snapshot(&self, ctx: &CallContext) -> Result<StatusSnapshot>;

    /// Traffic counters of one user summed over `window`.
    async fn user_traffic(
        &self,
        ctx: &CallContext,
        user_id: i64,
        window: TimeWindow,
    ) -> Result<TrafficStats>;
}
