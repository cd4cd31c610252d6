//! Host status collection backed by `sysinfo`, plus the per-user traffic ledger.

use super::StatusCollector;
use crate::context::CallContext;
use crate::error::{NodeError, Result};
use crate::model::{
    DaemonState, DaemonStatus, NetIo, StatusSnapshot, TimeWindow, TrafficStats, Usage,
};
use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, ProcessStatus, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::{debug, warn};

const UNKNOWN_VERSION: &str = "Unknown";
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// One line of the traffic ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub user_id: i64,
    /// Unix seconds
    pub timestamp: i64,
    pub up: u64,
    pub down: u64,
}

/// JSON-lines file of traffic samples appended by the daemon's stats exporter.
#[derive(Debug, Clone)]
pub struct TrafficLedger {
    path: PathBuf,
}

impl TrafficLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sum of one user's samples whose timestamp falls inside `window`.
    ///
    /// A missing ledger means nothing was recorded yet. Unparsable lines
    /// (e.g. a line still being written) are skipped.
    pub async fn totals(&self, user_id: i64, window: TimeWindow) -> Result<TrafficStats> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TrafficStats::default())
            }
            Err(e) => {
                return Err(NodeError::Collector(format!(
                    "cannot read traffic ledger {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut stats = TrafficStats::default();
        for (lineno, line) in contents.split(|b| *b == b'\n').enumerate() {
            if line.trim_ascii().is_empty() {
                continue;
            }
            let sample: TrafficSample = match serde_json::from_slice(line) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Skipping ledger line {}: {}", lineno + 1, e);
                    continue;
                }
            };
            if sample.user_id != user_id {
                continue;
            }
            let in_window = DateTime::from_timestamp(sample.timestamp, 0)
                .map(|at| window.contains(at))
                .unwrap_or(false);
            if in_window {
                stats.up = stats.up.saturating_add(sample.up);
                stats.down = stats.down.saturating_add(sample.down);
            }
        }

        Ok(stats)
    }
}

/// Host figures gathered in one blocking pass over `sysinfo`.
struct HostSample {
    cpu: f64,
    memory: Usage,
    disk: Usage,
    loads: Vec<f64>,
    uptime: u64,
    daemon_state: DaemonState,
    net_totals: NetIo,
}

/// Cumulative interface counters from the previous snapshot.
struct NetSample {
    at: Instant,
    totals: NetIo,
}

/// `StatusCollector` reading the local host.
pub struct HostStatusCollector {
    system: Arc<Mutex<System>>,
    previous_net: Mutex<Option<NetSample>>,
    disk_mount: PathBuf,
    daemon_process: String,
    daemon_binary: Option<PathBuf>,
    proc_net: PathBuf,
    ledger: TrafficLedger,
}

impl HostStatusCollector {
    pub fn new(ledger: TrafficLedger) -> Self {
        let mut system = System::new();
        // CPU usage is measured between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system: Arc::new(Mutex::new(system)),
            previous_net: Mutex::new(None),
            disk_mount: PathBuf::from("/"),
            daemon_process: "xray".to_string(),
            daemon_binary: None,
            proc_net: PathBuf::from("/proc/net"),
            ledger,
        }
    }

    /// Mount point whose usage is reported as disk usage.
    pub fn with_disk_mount(mut self, mount: impl Into<PathBuf>) -> Self {
        self.disk_mount = mount.into();
        self
    }

    /// Daemon process name and, optionally, the binary probed for its version.
    pub fn with_daemon(mut self, process: impl Into<String>, binary: Option<PathBuf>) -> Self {
        self.daemon_process = process.into();
        self.daemon_binary = binary;
        self
    }

    /// Directory holding the kernel socket tables (`tcp`, `tcp6`, `udp`, `udp6`).
    pub fn with_proc_net(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proc_net = dir.into();
        self
    }

    fn sample_host(
        system: &Mutex<System>,
        disk_mount: &Path,
        daemon_process: &str,
    ) -> Result<HostSample> {
        let mut sys = system
            .lock()
            .map_err(|_| NodeError::Collector("system sampler lock poisoned".into()))?;

        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let cpu = (f64::from(sys.global_cpu_usage()) / 100.0).clamp(0.0, 1.0);
        let memory = Usage::new(sys.used_memory(), sys.total_memory());

        let daemon_state = daemon_state(&sys, daemon_process);
        drop(sys);

        let load = System::load_average();

        Ok(HostSample {
            cpu,
            memory,
            disk: disk_usage(disk_mount),
            loads: vec![load.one, load.five, load.fifteen],
            uptime: System::uptime(),
            daemon_state,
            net_totals: network_totals(),
        })
    }

    /// Bytes per second since the previous snapshot, zero on the first one.
    fn net_rate(&self, totals: NetIo) -> Result<NetIo> {
        let mut previous = self
            .previous_net
            .lock()
            .map_err(|_| NodeError::Collector("network sampler lock poisoned".into()))?;
        let now = Instant::now();

        let rate = match previous.as_ref() {
            Some(prev) => {
                let secs = now.duration_since(prev.at).as_secs_f64();
                if secs > 0.0 {
                    NetIo {
                        up: (totals.up.saturating_sub(prev.totals.up) as f64 / secs) as u64,
                        down: (totals.down.saturating_sub(prev.totals.down) as f64 / secs) as u64,
                    }
                } else {
                    NetIo::default()
                }
            }
            None => NetIo::default(),
        };

        *previous = Some(NetSample { at: now, totals });
        Ok(rate)
    }

    async fn socket_count(&self, tables: &[&str]) -> u64 {
        let mut count = 0;
        for table in tables {
            // First line of each table is a header.
            if let Ok(contents) = tokio::fs::read_to_string(self.proc_net.join(table)).await {
                count += contents
                    .lines()
                    .skip(1)
                    .filter(|l| !l.trim().is_empty())
                    .count() as u64;
            }
        }
        count
    }

    async fn daemon_version(&self, ctx: &CallContext) -> String {
        let Some(binary) = self.daemon_binary.as_ref() else {
            return UNKNOWN_VERSION.to_string();
        };

        let mut command = Command::new(binary);
        command
            .arg("version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(ctx.bound(VERSION_PROBE_TIMEOUT), command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                parse_version(&String::from_utf8_lossy(&output.stdout))
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
            }
            Ok(Ok(output)) => {
                debug!("{} version exited with {}", binary.display(), output.status);
                UNKNOWN_VERSION.to_string()
            }
            Ok(Err(e)) => {
                debug!("Cannot run {}: {}", binary.display(), e);
                UNKNOWN_VERSION.to_string()
            }
            Err(_) => UNKNOWN_VERSION.to_string(),
        }
    }
}

#[async_trait]
impl StatusCollector for HostStatusCollector {
    async fn snapshot(&self, ctx: &CallContext) -> Result<StatusSnapshot> {
        ctx.check()?;

        let system = Arc::clone(&self.system);
        let disk_mount = self.disk_mount.clone();
        let daemon_process = self.daemon_process.clone();
        let host = tokio::task::spawn_blocking(move || {
            Self::sample_host(&system, &disk_mount, &daemon_process)
        })
        .await
        .map_err(|e| NodeError::Collector(format!("sampler task failed: {}", e)))??;

        let net_io = self.net_rate(host.net_totals)?;
        let tcp_count = self.socket_count(&["tcp", "tcp6"]).await;
        let udp_count = self.socket_count(&["udp", "udp6"]).await;
        let version = self.daemon_version(ctx).await;

        Ok(StatusSnapshot {
            cpu: host.cpu,
            memory: host.memory,
            disk: host.disk,
            loads: host.loads,
            daemon: DaemonStatus {
                version,
                state: host.daemon_state,
            },
            tcp_count,
            udp_count,
            net_io,
            uptime: host.uptime,
        })
    }

    async fn user_traffic(
        &self,
        ctx: &CallContext,
        user_id: i64,
        window: TimeWindow,
    ) -> Result<TrafficStats> {
        ctx.check()?;
        self.ledger.totals(user_id, window).await
    }
}

/// State of the daemon among the processes last refreshed into `sys`.
///
/// `Running` wins over zombie or dead entries sharing the name.
pub(super) fn daemon_state(sys: &System, process: &str) -> DaemonState {
    sys.processes_by_exact_name(OsStr::new(process))
        .map(|p| match p.status() {
            ProcessStatus::Zombie | ProcessStatus::Dead => DaemonState::Error,
            _ => DaemonState::Running,
        })
        .min_by_key(|state| *state != DaemonState::Running)
        .unwrap_or(DaemonState::Stop)
}

/// Usage of the disk whose mount point is the longest prefix of `mount`.
///
/// Reports zero/zero when nothing matches, which the facade rejects as
/// invalid collector data.
fn disk_usage(mount: &Path) -> Usage {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| mount.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| {
            let total = d.total_space();
            Usage::new(total.saturating_sub(d.available_space()), total)
        })
        .unwrap_or_default()
}

/// Cumulative transmitted/received bytes over all non-loopback interfaces.
fn network_totals() -> NetIo {
    let networks = Networks::new_with_refreshed_list();
    networks
        .list()
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .fold(NetIo::default(), |acc, (_, data)| NetIo {
            up: acc.up.saturating_add(data.total_transmitted()),
            down: acc.down.saturating_add(data.total_received()),
        })
}

/// Second token of the first output line, e.g. `Xray 1.8.4 (Xray, Penetrates Everything.)`.
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}
