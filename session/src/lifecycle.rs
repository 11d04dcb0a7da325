//! Session lifecycle: spawn, supervise, tear down.
//!
//! A session moves `Starting -> Running -> Exiting -> Cleaned` and reaches
//! the terminal state exactly once, whether the child exits on its own or a
//! signal cuts the session short. Teardown failures are warnings scoped to
//! the individual resource; they never mask the child's exit code.

use crate::engine::{Engine, EngineError};
use crate::launch::LaunchSpec;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Override for the stop grace period, humantime syntax (e.g. "30s").
pub const STOP_TIMEOUT_ENV: &str = "BURROW_STOP_TIMEOUT";

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Exiting,
    Cleaned,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn container session: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed waiting for container session: {0}")]
    Wait(#[source] std::io::Error),
}

/// Per-volume cleanup outcomes. Failures are recorded, logged and otherwise
/// non-escalating.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub attempts: Vec<(String, Result<(), EngineError>)>,
}

impl CleanupReport {
    pub fn all_ok(&self) -> bool {
        self.attempts.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn attempted(&self, volume: &str) -> bool {
        self.attempts.iter().any(|(name, _)| name == volume)
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    /// The container's own exit code, preserved across teardown.
    pub exit_code: i32,
    pub cleanup: CleanupReport,
}

/// A single container session and its ephemeral resources.
pub struct Session {
    engine: Engine,
    spec: LaunchSpec,
    state: SessionState,
}

impl Session {
    pub fn new(engine: Engine, spec: LaunchSpec) -> Self {
        Self {
            engine,
            spec,
            state: SessionState::Starting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Spawn the container attached to the controlling terminal and drive it
    /// to completion. Interrupt and terminate signals stop the container
    /// (bounded) and then fall through to the same cleanup path a normal
    /// exit takes.
    pub async fn run(mut self) -> Result<SessionOutcome, LaunchError> {
        let mut sigint = signal(SignalKind::interrupt()).map_err(LaunchError::Signals)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(LaunchError::Signals)?;

        let mut command = self.engine.command();
        command
            .args(self.spec.run_args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(LaunchError::Spawn)?;
        self.state = SessionState::Running;
        info!(container = %self.spec.container_name, "session container started");

        let mut stop_issued = false;
        let wait_result = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = sigint.recv(), if !stop_issued => {
                    info!("interrupt received, stopping session container");
                    stop_issued = true;
                    self.stop_container().await;
                }
                _ = sigterm.recv(), if !stop_issued => {
                    info!("terminate received, stopping session container");
                    stop_issued = true;
                    self.stop_container().await;
                }
            }
        };

        self.state = SessionState::Exiting;
        let cleanup = self.cleanup().await;

        let status = wait_result.map_err(LaunchError::Wait)?;
        Ok(SessionOutcome {
            exit_code: exit_code(status),
            cleanup,
        })
    }

    async fn stop_container(&mut self) {
        self.state = SessionState::Exiting;
        let grace = stop_grace();
        if let Err(err) = self
            .engine
            .stop_container(&self.spec.container_name, grace)
            .await
        {
            warn!(
                container = %self.spec.container_name,
                error = %err,
                "stop request failed; waiting for the container to exit anyway"
            );
        }
    }

    /// Remove the session's ephemeral volumes. Idempotent: the second and
    /// later calls are no-ops, and removal of a never-created volume
    /// succeeds.
    pub async fn cleanup(&mut self) -> CleanupReport {
        if self.state == SessionState::Cleaned {
            return CleanupReport::default();
        }
        let report = remove_session_volumes(&self.engine, &self.spec).await;
        self.state = SessionState::Cleaned;
        report
    }
}

/// Best-effort removal of both session volumes. Each failure is logged as a
/// warning and does not block the other removal.
pub async fn remove_session_volumes(engine: &Engine, spec: &LaunchSpec) -> CleanupReport {
    let mut report = CleanupReport::default();
    for volume in [&spec.state_volume, &spec.workspace_volume] {
        let outcome = engine.remove_volume(volume).await;
        match &outcome {
            Ok(()) => info!(volume = %volume, "removed session volume"),
            Err(err) => warn!(volume = %volume, error = %err, "failed to remove session volume"),
        }
        report.attempts.push((volume.clone(), outcome));
    }
    report
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        use std::os::unix::process::ExitStatusExt;
        128 + status.signal().unwrap_or(0)
    })
}

fn stop_grace() -> Duration {
    match std::env::var(STOP_TIMEOUT_ENV) {
        Ok(raw) => match humantime::parse_duration(raw.trim()) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(value = %raw, error = %err, "invalid stop timeout, using default");
                DEFAULT_STOP_GRACE
            }
        },
        Err(_) => DEFAULT_STOP_GRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::stub_engine;
    use crate::launch::HostCredentials;
    use config_probe::DiscoveredConfig;
    use serial_test::serial;
    use std::path::{Path, PathBuf};
    use vet::RepositoryReference;

    fn make_spec() -> LaunchSpec {
        let reference =
            RepositoryReference::vet("https://github.com/acme/widgets.git", "widgets", "main")
                .unwrap();
        let credentials = HostCredentials {
            agent_socket: PathBuf::from("/tmp/agent.sock"),
            ssh_dir: None,
            git_identity: None,
        };
        LaunchSpec::assemble(
            crate::IMAGE_NAME,
            &reference,
            &DiscoveredConfig::default(),
            &credentials,
            false,
        )
    }

    fn recording_stub(dir: &Path, record: &Path, extra: &str) -> PathBuf {
        let body = format!("echo \"$@\" >> '{}'\n{extra}\nexit 0", record.display());
        stub_engine(dir, &body)
    }

    fn recorded_lines(record: &Path) -> Vec<String> {
        std::fs::read_to_string(record)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn normal_exit_removes_both_volumes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record");
        let stub = recording_stub(dir.path(), &record, "");
        let session = Session::new(Engine::with_binary(stub.to_string_lossy()), make_spec());
        let state_volume = session.spec().state_volume.clone();
        let workspace_volume = session.spec().workspace_volume.clone();

        let outcome = session.run().await.unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.cleanup.all_ok());
        assert!(outcome.cleanup.attempted(&state_volume));
        assert!(outcome.cleanup.attempted(&workspace_volume));

        let removals: Vec<String> = recorded_lines(&record)
            .into_iter()
            .filter(|line| line.starts_with("volume rm"))
            .collect();
        assert_eq!(removals.len(), 2);
        assert!(removals[0].contains(&state_volume));
        assert!(removals[1].contains(&workspace_volume));
    }

    #[tokio::test]
    async fn one_failed_removal_does_not_block_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record");
        // Volume removal fails for the state volume only.
        let extra = r#"case "$1 $2" in "volume rm") case "$*" in *-state*) exit 1;; esac;; esac"#;
        let stub = recording_stub(dir.path(), &record, extra);
        let session = Session::new(Engine::with_binary(stub.to_string_lossy()), make_spec());
        let workspace_volume = session.spec().workspace_volume.clone();

        let outcome = session.run().await.unwrap();

        assert!(!outcome.cleanup.all_ok());
        assert!(outcome.cleanup.attempted(&workspace_volume));
        let failures: Vec<_> = outcome
            .cleanup
            .attempts
            .iter()
            .filter(|(_, r)| r.is_err())
            .collect();
        assert_eq!(failures.len(), 1);

        let removals = recorded_lines(&record)
            .into_iter()
            .filter(|line| line.starts_with("volume rm"))
            .count();
        assert_eq!(removals, 2);
    }

    #[tokio::test]
    async fn teardown_failure_does_not_mask_child_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record");
        let extra = r#"case "$1" in run) exit 3;; volume) exit 1;; esac"#;
        let stub = recording_stub(dir.path(), &record, extra);
        let session = Session::new(Engine::with_binary(stub.to_string_lossy()), make_spec());

        let outcome = session.run().await.unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.cleanup.all_ok());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record");
        let stub = recording_stub(dir.path(), &record, "");
        let mut session = Session::new(Engine::with_binary(stub.to_string_lossy()), make_spec());

        assert_eq!(session.state(), SessionState::Starting);
        let first = session.cleanup().await;
        assert_eq!(first.attempts.len(), 2);
        assert_eq!(session.state(), SessionState::Cleaned);

        let second = session.cleanup().await;
        assert!(second.attempts.is_empty());
        assert_eq!(recorded_lines(&record).len(), 2);
    }

    #[test]
    #[serial]
    fn stop_grace_honors_env_override() {
        std::env::set_var(STOP_TIMEOUT_ENV, "30s");
        assert_eq!(stop_grace(), Duration::from_secs(30));

        std::env::set_var(STOP_TIMEOUT_ENV, "not a duration");
        assert_eq!(stop_grace(), DEFAULT_STOP_GRACE);

        std::env::remove_var(STOP_TIMEOUT_ENV);
        assert_eq!(stop_grace(), DEFAULT_STOP_GRACE);
    }
}
