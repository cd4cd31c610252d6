/*!
 * Configuration types for the relaynode agent
 */

use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level agent configuration, loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub daemon: DaemonConfig,
    pub status: StatusConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: all interfaces)
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document holding inbound definitions
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/relaynode/inbounds.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Program and arguments that restart the forwarding daemon
    pub restart_command: Vec<String>,

    /// Process name used to detect whether the daemon is running
    pub process_name: String,

    /// Daemon binary, probed with `<binary> version`
    pub binary: Option<PathBuf>,

    pub reload_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            restart_command: vec![
                "systemctl".to_string(),
                "restart".to_string(),
                "xray".to_string(),
            ],
            process_name: "xray".to_string(),
            binary: Some(PathBuf::from("/usr/local/bin/xray")),
            reload_timeout_secs: default_reload_timeout(),
        }
    }
}

impl DaemonConfig {
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Mount point reported as disk usage
    pub disk_mount: PathBuf,

    /// JSON-lines ledger of per-user traffic samples
    pub traffic_ledger: PathBuf,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            disk_mount: PathBuf::from("/"),
            traffic_ledger: PathBuf::from("/var/lib/relaynode/traffic.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Line format on stdout; the file sink is always JSON
    pub format: LogFormat,

    /// Write JSON logs to this file instead of stdout
    pub file: Option<PathBuf>,
}

/// Stdout log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,

    /// One JSON object per line, for log shippers
    Json,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_reload_timeout() -> u64 {
    30
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AgentConfig = toml::from_str(&contents)
            .map_err(|e| NodeError::Config(format!("invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self
            .daemon
            .restart_command
            .first()
            .map_or(true, |p| p.trim().is_empty())
        {
            return Err(NodeError::Config(
                "daemon.restart_command cannot be empty".to_string(),
            ));
        }
        if self.daemon.reload_timeout_secs == 0 {
            return Err(NodeError::Config(
                "daemon.reload_timeout_secs must be positive".to_string(),
            ));
        }
        if self.daemon.process_name.trim().is_empty() {
            return Err(NodeError::Config(
                "daemon.process_name cannot be empty".to_string(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.bind, self.server.port)
            .parse()
            .map_err(|e| {
                NodeError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.server.bind, self.server.port, e
                ))
            })
    }
}
