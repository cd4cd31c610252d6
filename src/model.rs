/*!
 * Data model for node control calls
 *
 * Request-side records (`UserSyncRecord`, `NodeConfigUpdate`) are built per
 * call and handed to the config store as `InboundRecord`s. Telemetry types
 * (`StatusSnapshot`, `TrafficStats`) are produced fresh by the status
 * collector and only reshaped here.
 */

use crate::error::{NodeError, RequestError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user entry pushed by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSyncRecord {
    pub id: i64,
    pub email: String,
    /// Credential secret the daemon authenticates the user with
    pub uuid: String,
    /// Bytes per second, 0 = unlimited
    pub speed_limit: i64,
    pub enable: bool,
}

impl UserSyncRecord {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.email.trim().is_empty() {
            return Err(RequestError::invalid(
                "email",
                format!("user {} has an empty email", self.id),
            ));
        }
        if self.uuid.trim().is_empty() {
            return Err(RequestError::invalid(
                "uuid",
                format!("user {} has an empty uuid", self.id),
            ));
        }
        if self.speed_limit < 0 {
            return Err(RequestError::invalid(
                "speed_limit",
                format!("user {} has a negative speed limit", self.id),
            ));
        }
        Ok(())
    }
}

/// Inbound (listener) settings pushed by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfigUpdate {
    pub protocol: String,
    pub port: u32,
    /// Protocol-specific JSON document, passed through untouched
    pub settings: String,
}

impl NodeConfigUpdate {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.protocol.trim().is_empty() {
            return Err(RequestError::MissingField("protocol"));
        }
        if self.port == 0 {
            return Err(RequestError::MissingField("port"));
        }
        if self.port > u32::from(u16::MAX) {
            return Err(RequestError::invalid(
                "port",
                format!("{} is out of range", self.port),
            ));
        }
        if !self.settings.trim().is_empty() {
            serde_json::from_str::<serde_json::Value>(&self.settings)
                .map_err(|e| RequestError::invalid("settings", e.to_string()))?;
        }
        Ok(())
    }
}

/// Identity an inbound record is upserted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKey {
    User(i64),
    Port(u32),
}

impl fmt::Display for InboundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundKey::User(id) => write!(f, "user {}", id),
            InboundKey::Port(port) => write!(f, "port {}", port),
        }
    }
}

/// Record owned by the config store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub email: String,
    pub uuid: String,
    pub speed_limit: i64,
    pub enable: bool,
    pub protocol: String,
    pub port: u32,
    pub settings: String,
}

impl InboundRecord {
    pub fn key(&self) -> InboundKey {
        match self.user_id {
            Some(id) => InboundKey::User(id),
            None => InboundKey::Port(self.port),
        }
    }
}

impl From<&UserSyncRecord> for InboundRecord {
    fn from(user: &UserSyncRecord) -> Self {
        Self {
            user_id: Some(user.id),
            email: user.email.clone(),
            uuid: user.uuid.clone(),
            speed_limit: user.speed_limit,
            enable: user.enable,
            ..Default::default()
        }
    }
}

impl From<&NodeConfigUpdate> for InboundRecord {
    fn from(config: &NodeConfigUpdate) -> Self {
        Self {
            protocol: config.protocol.clone(),
            port: config.port,
            settings: config.settings.clone(),
            enable: true,
            ..Default::default()
        }
    }
}

/// Current/total pair reported for memory and disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub current: u64,
    pub total: u64,
}

impl Usage {
    pub fn new(current: u64, total: u64) -> Self {
        Self { current, total }
    }

    /// `current / total` in `[0, 1]`.
    ///
    /// A zero total or a current above total is reported as collector data
    /// error instead of leaking NaN/Inf or a fraction above one.
    pub fn fraction(&self, what: &str) -> Result<f64, NodeError> {
        if self.total == 0 {
            return Err(NodeError::InvalidData(format!(
                "{} total reported as zero",
                what
            )));
        }
        if self.current > self.total {
            return Err(NodeError::InvalidData(format!(
                "{} current {} exceeds total {}",
                what, self.current, self.total
            )));
        }
        Ok(self.current as f64 / self.total as f64)
    }
}

/// Lifecycle state of the forwarding daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running,
    Stop,
    Error,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DaemonState::Running => "running",
            DaemonState::Stop => "stop",
            DaemonState::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub version: String,
    pub state: DaemonState,
}

/// Network throughput in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetIo {
    pub up: u64,
    pub down: u64,
}

/// Point-in-time host and daemon metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// CPU usage as a fraction in `[0, 1]`
    pub cpu: f64,
    pub memory: Usage,
    pub disk: Usage,
    pub loads: Vec<f64>,
    pub daemon: DaemonStatus,
    pub tcp_count: u64,
    pub udp_count: u64,
    pub net_io: NetIo,
    /// Seconds
    pub uptime: u64,
}

/// Inclusive query window for traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window from unix-second bounds.
    pub fn from_unix(start: i64, end: i64) -> Result<Self, RequestError> {
        if end < start {
            return Err(RequestError::InvalidTimeRange { start, end });
        }
        let start_at = DateTime::from_timestamp(start, 0)
            .ok_or_else(|| RequestError::invalid("start_time", "out of range"))?;
        let end_at = DateTime::from_timestamp(end, 0)
            .ok_or_else(|| RequestError::invalid("end_time", "out of range"))?;
        Ok(Self {
            start: start_at,
            end: end_at,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub up: u64,
    pub down: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemLoad {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub load_averages: Vec<f64>,
}

impl SystemLoad {
    pub fn derive(snapshot: &StatusSnapshot) -> Result<Self, NodeError> {
        if !snapshot.cpu.is_finite() || !(0.0..=1.0).contains(&snapshot.cpu) {
            return Err(NodeError::InvalidData(format!(
                "cpu usage {} is not a fraction",
                snapshot.cpu
            )));
        }
        Ok(Self {
            cpu_usage: snapshot.cpu,
            memory_usage: snapshot.memory.fraction("memory")?,
            disk_usage: snapshot.disk.fraction("disk")?,
            load_averages: snapshot.loads.clone(),
        })
    }
}

/// Payload of `GetNodeStatus`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub load: SystemLoad,
    pub daemon_version: String,
    pub daemon_state: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub tcp_connections: u64,
    pub udp_connections: u64,
    pub up_per_sec: u64,
    pub down_per_sec: u64,
}

/// Payload of `GetSystemStats`.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub load: SystemLoad,
    pub network: NetworkStats,
    pub uptime: u64,
}

/// Uniform `{success, message, payload}` result of every facade call.
///
/// A failed envelope never carries a payload and always has a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    success: bool,
    message: String,
    payload: Option<T>,
}

impl<T> Envelope<T> {
    pub fn succeeded(payload: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message.push_str("unknown failure");
        }
        Self {
            success: false,
            message,
            payload: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_parts(self) -> (bool, String, Option<T>) {
        (self.success, self.message, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserSyncRecord {
        UserSyncRecord {
            id,
            email: format!("u{}@x", id),
            uuid: format!("uuid-{}", id),
            speed_limit: 0,
            enable: true,
        }
    }

    #[test]
    fn test_usage_fraction_exact() {
        assert_eq!(Usage::new(50, 100).fraction("memory").unwrap(), 0.5);
        assert_eq!(Usage::new(0, 100).fraction("memory").unwrap(), 0.0);
        assert_eq!(Usage::new(100, 100).fraction("memory").unwrap(), 1.0);
    }

    #[test]
    fn test_usage_fraction_zero_total() {
        let err = Usage::new(50, 0).fraction("memory").unwrap_err();
        assert!(matches!(err, NodeError::InvalidData(_)));
        assert!(err.to_string().contains("memory total reported as zero"));
    }

    #[test]
    fn test_usage_fraction_over_total() {
        assert!(Usage::new(101, 100).fraction("disk").is_err());
    }

    #[test]
    fn test_daemon_state_display() {
        assert_eq!(DaemonState::Running.to_string(), "running");
        assert_eq!(DaemonState::Stop.to_string(), "stop");
        assert_eq!(DaemonState::Error.to_string(), "error");
    }

    #[test]
    fn test_user_validation() {
        assert!(user(1).validate().is_ok());

        let mut bad = user(2);
        bad.uuid = String::new();
        assert_eq!(
            bad.validate().unwrap_err(),
            RequestError::invalid("uuid", "user 2 has an empty uuid")
        );

        let mut bad = user(3);
        bad.email = "  ".into();
        assert!(bad.validate().is_err());

        let mut bad = user(4);
        bad.speed_limit = -1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_node_config_validation() {
        let ok = NodeConfigUpdate {
            protocol: "vless".into(),
            port: 443,
            settings: r#"{"clients":[]}"#.into(),
        };
        assert!(ok.validate().is_ok());

        let no_port = NodeConfigUpdate { port: 0, ..ok.clone() };
        assert_eq!(
            no_port.validate().unwrap_err(),
            RequestError::MissingField("port")
        );

        let no_protocol = NodeConfigUpdate {
            protocol: String::new(),
            ..ok.clone()
        };
        assert_eq!(
            no_protocol.validate().unwrap_err(),
            RequestError::MissingField("protocol")
        );

        let big_port = NodeConfigUpdate {
            port: 70_000,
            ..ok.clone()
        };
        assert!(big_port.validate().is_err());

        let bad_settings = NodeConfigUpdate {
            settings: "{not json".into(),
            ..ok.clone()
        };
        assert!(bad_settings.validate().is_err());

        let empty_settings = NodeConfigUpdate {
            settings: String::new(),
            ..ok
        };
        assert!(empty_settings.validate().is_ok());
    }

    #[test]
    fn test_inbound_keys() {
        let from_user = InboundRecord::from(&user(9));
        assert_eq!(from_user.key(), InboundKey::User(9));

        let from_config = InboundRecord::from(&NodeConfigUpdate {
            protocol: "trojan".into(),
            port: 8443,
            settings: String::new(),
        });
        assert_eq!(from_config.key(), InboundKey::Port(8443));
        assert_eq!(from_config.key().to_string(), "port 8443");
    }

    #[test]
    fn test_time_window() {
        let window = TimeWindow::from_unix(100, 200).unwrap();
        assert!(window.contains(DateTime::from_timestamp(100, 0).unwrap()));
        assert!(window.contains(DateTime::from_timestamp(200, 0).unwrap()));
        assert!(!window.contains(DateTime::from_timestamp(201, 0).unwrap()));

        assert!(TimeWindow::from_unix(50, 50).is_ok());
        assert_eq!(
            TimeWindow::from_unix(200, 100).unwrap_err(),
            RequestError::InvalidTimeRange {
                start: 200,
                end: 100
            }
        );
        assert!(TimeWindow::from_unix(0, i64::MAX).is_err());
    }

    #[test]
    fn test_envelope_invariants() {
        let ok = Envelope::succeeded(3u32, "");
        assert!(ok.success());
        assert_eq!(ok.payload(), Some(&3));

        let failed: Envelope<u32> = Envelope::failed("");
        assert!(!failed.success());
        assert!(!failed.message().is_empty());
        assert!(failed.payload().is_none());
    }
}
