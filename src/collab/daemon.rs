//! Daemon controller that applies configuration by running a restart command.

use super::status::daemon_state;
use super::DaemonController;
use crate::context::CallContext;
use crate::error::{NodeError, Result};
use crate::model::DaemonState;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Fingerprint = [u8; 32];

/// Restarts the forwarding daemon with an external command
/// (e.g. `systemctl restart xray`).
///
/// A non-forced reload is skipped when the persisted configuration has not
/// changed since the last successful restart and the daemon process is
/// still alive. Reloads are serialized.
pub struct CommandDaemonController {
    restart_command: Vec<String>,
    process_name: String,
    config_path: PathBuf,
    reload_timeout: Duration,
    /// Fingerprint of the configuration the daemon last restarted with
    applied: Mutex<Option<Fingerprint>>,
}

impl CommandDaemonController {
    pub fn new(
        restart_command: Vec<String>,
        process_name: impl Into<String>,
        config_path: impl Into<PathBuf>,
        reload_timeout: Duration,
    ) -> Result<Self> {
        if restart_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(NodeError::Config(
                "daemon restart command cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            restart_command,
            process_name: process_name.into(),
            config_path: config_path.into(),
            reload_timeout,
            applied: Mutex::new(None),
        })
    }

    async fn fingerprint(&self) -> Result<Fingerprint> {
        let contents = match tokio::fs::read(&self.config_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let digest = Sha256::digest(&contents);
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&digest);
        Ok(fingerprint)
    }

    async fn daemon_running(&self) -> Result<bool> {
        let process = self.process_name.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            daemon_state(&sys, &process) == DaemonState::Running
        })
        .await
        .map_err(|e| NodeError::Daemon(format!("process check failed: {}", e)))
    }

    async fn run_restart(&self, limit: Duration) -> Result<()> {
        let (program, args) = self
            .restart_command
            .split_first()
            .ok_or_else(|| NodeError::Config("daemon restart command cannot be empty".into()))?;

        debug!("Running {:?} (limit {:?})", self.restart_command, limit);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| NodeError::Daemon(format!("{} timed out after {:?}", program, limit)))?
            .map_err(|e| NodeError::Daemon(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(NodeError::Daemon(if detail.is_empty() {
                format!("{} exited with {}", program, output.status)
            } else {
                format!("{} exited with {}: {}", program, output.status, detail)
            }));
        }

        Ok(())
    }
}

#[async_trait]
impl DaemonController for CommandDaemonController {
    async fn reload(&self, ctx: &CallContext, force: bool) -> Result<()> {
        let mut applied = self.applied.lock().await;
        let fingerprint = self.fingerprint().await?;

        if !force && *applied == Some(fingerprint) {
            if self.daemon_running().await? {
                debug!("Configuration unchanged, skipping daemon restart");
                return Ok(());
            }
            warn!("{} is not running, restarting", self.process_name);
        }

        ctx.check()?;
        let limit = ctx.bound(self.reload_timeout);

        if let Err(e) = self.run_restart(limit).await {
            warn!("Daemon restart failed: {}", e);
            return Err(e);
        }

        *applied = Some(fingerprint);
        info!(
            "Daemon restarted with configuration {}",
            &hex::encode(fingerprint)[..12]
        );
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    const NO_DAEMON: &str = "relaynode-test-no-such-daemon";

    fn sh(script: String) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script]
    }

    fn restarts(path: &std::path::Path) -> usize {
        std::fs::read_to_string(path)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn counting(
        counter: &std::path::Path,
        process: &str,
        config: &std::path::Path,
    ) -> CommandDaemonController {
        CommandDaemonController::new(
            sh(format!("echo restart >> {}", counter.display())),
            process,
            config,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_command_rejected() {
        let result =
            CommandDaemonController::new(vec![], "xray", "/tmp/x.json", Duration::from_secs(1));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[tokio::test]
    async fn test_non_forced_reload_skips_unchanged_config() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("inbounds.json");
        let counter = dir.path().join("restarts.log");
        std::fs::write(&config, b"{\"inbounds\":[]}").unwrap();

        // Stand-in for a live daemon.
        let mut daemon = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let controller = counting(&counter, "sleep", &config);
        let ctx = CallContext::background();

        controller.reload(&ctx, false).await.unwrap();
        controller.reload(&ctx, false).await.unwrap();
        assert_eq!(restarts(&counter), 1);

        controller.reload(&ctx, true).await.unwrap();
        assert_eq!(restarts(&counter), 2);

        std::fs::write(&config, b"{\"inbounds\":[{\"port\":443}]}").unwrap();
        controller.reload(&ctx, false).await.unwrap();
        assert_eq!(restarts(&counter), 3);

        daemon.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_config_restarts_stopped_daemon() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("inbounds.json");
        let counter = dir.path().join("restarts.log");
        std::fs::write(&config, b"{\"inbounds\":[]}").unwrap();

        let controller = counting(&counter, NO_DAEMON, &config);
        let ctx = CallContext::background();

        controller.reload(&ctx, false).await.unwrap();
        controller.reload(&ctx, false).await.unwrap();
        assert_eq!(restarts(&counter), 2);
    }

    #[tokio::test]
    async fn test_failed_restart_reports_stderr() {
        let dir = tempdir().unwrap();
        let controller = CommandDaemonController::new(
            sh("echo 'port busy' >&2; exit 1".into()),
            NO_DAEMON,
            dir.path().join("inbounds.json"),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = controller
            .reload(&CallContext::background(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Daemon(_)));
        assert!(err.to_string().contains("port busy"));
    }

    #[tokio::test]
    async fn test_failed_restart_is_retried_on_next_reload() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("fail-once");
        let counter = dir.path().join("restarts.log");
        std::fs::write(&marker, b"").unwrap();

        let script = format!(
            "echo run >> {counter}; if [ -e {marker} ]; then rm {marker}; exit 1; fi",
            counter = counter.display(),
            marker = marker.display()
        );
        let controller = CommandDaemonController::new(
            sh(script),
            NO_DAEMON,
            dir.path().join("inbounds.json"),
            Duration::from_secs(5),
        )
        .unwrap();
        let ctx = CallContext::background();

        assert!(controller.reload(&ctx, false).await.is_err());
        assert!(controller.reload(&ctx, false).await.is_ok());
        assert_eq!(restarts(&counter), 2);
    }

    #[tokio::test]
    async fn test_restart_timeout() {
        let dir = tempdir().unwrap();
        let controller = CommandDaemonController::new(
            vec!["sleep".into(), "5".into()],
            NO_DAEMON,
            dir.path().join("inbounds.json"),
            Duration::from_millis(100),
        )
        .unwrap();

        let err = controller
            .reload(&CallContext::background(), true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_call_deadline_shortens_restart_timeout() {
        let dir = tempdir().unwrap();
        let controller = CommandDaemonController::new(
            vec!["sleep".into(), "5".into()],
            NO_DAEMON,
            dir.path().join("inbounds.json"),
            Duration::from_secs(30),
        )
        .unwrap();

        let started = Instant::now();
        let err = controller
            .reload(&CallContext::with_timeout(Duration::from_millis(100)), true)
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Daemon(_)));
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_expired_context_skips_restart() {
        let dir = tempdir().unwrap();
        let counter = dir.path().join("restarts.log");
        let controller = counting(&counter, NO_DAEMON, &dir.path().join("inbounds.json"));

        let err = controller
            .reload(&CallContext::with_timeout(Duration::ZERO), true)
            .await
            .unwrap_err();
        assert!(err.is_deadline());
        assert_eq!(restarts(&counter), 0);
    }
}
