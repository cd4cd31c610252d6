//! Recording collaborator doubles for testing
//!
//! All mocks share one `CallLog` so tests can assert the exact order of calls
//! across collaborators and the context each call received.

use super::{ConfigStore, DaemonController, StatusCollector};
use crate::context::CallContext;
use crate::error::{NodeError, Result};
use crate::model::{
    DaemonState, DaemonStatus, InboundKey, InboundRecord, NetIo, StatusSnapshot, TimeWindow,
    TrafficStats, Usage,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upsert(InboundKey),
    Reload { force: bool },
    Snapshot,
    UserTraffic { user_id: i64, window: TimeWindow },
}

#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<(Call, CallContext)>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: Call, ctx: &CallContext) {
        self.entries.lock().unwrap().push((call, *ctx));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn contexts(&self) -> Vec<CallContext> {
        self.entries.lock().unwrap().iter().map(|(_, ctx)| *ctx).collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

/// Store that accepts every upsert except, optionally, the n-th one (0-based).
pub struct MockStore {
    log: CallLog,
    fail_at: Option<(usize, String)>,
    records: Mutex<Vec<InboundRecord>>,
}

impl MockStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_at: None,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, index: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((index, message.into()));
        self
    }

    /// Records applied so far, in upsert order.
    pub fn records(&self) -> Vec<InboundRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MockStore {
    async fn upsert(&self, ctx: &CallContext, record: InboundRecord) -> Result<()> {
        let attempt = self.log.count(|c| matches!(c, Call::Upsert(_)));
        self.log.record(Call::Upsert(record.key()), ctx);

        if let Some((index, message)) = &self.fail_at {
            if *index == attempt {
                return Err(NodeError::Store(message.clone()));
            }
        }

        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub struct MockDaemon {
    log: CallLog,
    failure: Option<String>,
}

impl MockDaemon {
    pub fn new(log: CallLog) -> Self {
        Self { log, failure: None }
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl DaemonController for MockDaemon {
    async fn reload(&self, ctx: &CallContext, force: bool) -> Result<()> {
        self.log.record(Call::Reload { force }, ctx);
        match &self.failure {
            Some(message) => Err(NodeError::Daemon(message.clone())),
            None => Ok(()),
        }
    }
}

pub struct MockCollector {
    log: CallLog,
    snapshot: StatusSnapshot,
    traffic: TrafficStats,
    failure: Option<String>,
}

impl MockCollector {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            snapshot: sample_snapshot(),
            traffic: TrafficStats::default(),
            failure: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: StatusSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_traffic(mut self, traffic: TrafficStats) -> Self {
        self.traffic = traffic;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    fn outcome<T>(&self, value: T) -> Result<T> {
        match &self.failure {
            Some(message) => Err(NodeError::Collector(message.clone())),
            None => Ok(value),
        }
    }
}

#[async_trait]
impl StatusCollector for MockCollector {
    async fn snapshot(&self, ctx: &CallContext) -> Result<StatusSnapshot> {
        self.log.record(Call::Snapshot, ctx);
        self.outcome(self.snapshot.clone())
    }

    async fn user_traffic(
        &self,
        ctx: &CallContext,
        user_id: i64,
        window: TimeWindow,
    ) -> Result<TrafficStats> {
        self.log.record(Call::UserTraffic { user_id, window }, ctx);
        self.outcome(self.traffic)
    }
}

/// Healthy host: 50% memory, 25% disk, daemon running.
pub fn sample_snapshot() -> StatusSnapshot {
    StatusSnapshot {
        cpu: 0.125,
        memory: Usage::new(50, 100),
        disk: Usage::new(250, 1000),
        loads: vec![0.5, 0.25, 0.125],
        daemon: DaemonStatus {
            version: "1.8.4".to_string(),
            state: DaemonState::Running,
        },
        tcp_count: 42,
        udp_count: 7,
        net_io: NetIo {
            up: 1024,
            down: 4096,
        },
        uptime: 3600,
    }
}
