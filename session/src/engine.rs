//! Thin wrapper around the container engine CLI.
//!
//! Every call is bounded by a timeout so a hung engine cannot wedge the
//! launcher. The binary is overridable through `BURROW_CONTAINER_RUNTIME`,
//! which doubles as the seam the test suite uses to substitute recorded stub
//! executables for the real engine.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_ENGINE: &str = "docker";
pub const RUNTIME_ENV: &str = "BURROW_CONTAINER_RUNTIME";

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(900);
pub const REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to invoke container engine {binary:?}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("container engine call `{what}` timed out after {seconds}s")]
    TimedOut { what: String, seconds: u64 },

    #[error("container engine call `{what}` exited with status {code}: {detail}")]
    Failed {
        what: String,
        code: i32,
        detail: String,
    },
}

/// Handle on the container engine binary. Cloneable and stateless; all state
/// lives in the engine daemon.
#[derive(Debug, Clone)]
pub struct Engine {
    binary: String,
}

impl Engine {
    /// Resolve the engine binary from the environment, defaulting to docker.
    pub fn from_env() -> Self {
        let binary = std::env::var(RUNTIME_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENGINE.to_string());
        Self { binary }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// A bare command for the engine binary; the caller supplies arguments
    /// and stdio wiring. Used by the lifecycle manager to spawn the session
    /// itself.
    pub fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Check that the engine daemon answers.
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.run_quiet("info", &["info"], QUERY_TIMEOUT).await
    }

    /// Whether an image with the given reference exists locally. Engine
    /// failures surface as `false`; a missing image is only diagnosed once
    /// the subsequent build also fails.
    pub async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        let mut command = self.command();
        command
            .args(["image", "inspect", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = timeout(QUERY_TIMEOUT, command.status())
            .await
            .map_err(|_| EngineError::TimedOut {
                what: "image inspect".to_string(),
                seconds: QUERY_TIMEOUT.as_secs(),
            })?
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        Ok(status.success())
    }

    /// Build the session image from a staged context, streaming build output
    /// to the operator's terminal.
    pub async fn build_image(&self, image: &str, context: &Path) -> Result<(), EngineError> {
        let containerfile = context.join("Containerfile");
        let mut command = self.command();
        command
            .arg("build")
            .arg("--tag")
            .arg(image)
            .arg("--file")
            .arg(&containerfile)
            .arg(context)
            .stdin(Stdio::null());

        let status = timeout(BUILD_TIMEOUT, command.status())
            .await
            .map_err(|_| EngineError::TimedOut {
                what: "build".to_string(),
                seconds: BUILD_TIMEOUT.as_secs(),
            })?
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !status.success() {
            return Err(EngineError::Failed {
                what: "build".to_string(),
                code: status.code().unwrap_or(-1),
                detail: "build output streamed above".to_string(),
            });
        }
        Ok(())
    }

    /// Ask the engine to stop a named container, giving it `grace` to shut
    /// down before the engine escalates.
    pub async fn stop_container(&self, name: &str, grace: Duration) -> Result<(), EngineError> {
        let grace_secs = grace.as_secs().max(1).to_string();
        // The outer bound leaves headroom beyond the engine's own grace
        // period so the engine can escalate to SIGKILL before we give up.
        let limit = grace + QUERY_TIMEOUT;
        self.run_quiet("stop", &["stop", "--time", &grace_secs, name], limit)
            .await
    }

    /// Remove a named volume. `--force` makes removal of a never-created
    /// volume succeed, keeping cleanup idempotent.
    pub async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.run_quiet("volume rm", &["volume", "rm", "--force", name], REMOVE_TIMEOUT)
            .await
    }

    async fn run_quiet(
        &self,
        what: &str,
        args: &[&str],
        limit: Duration,
    ) -> Result<(), EngineError> {
        debug!(engine = %self.binary, ?args, "engine call");
        let mut command = self.command();
        command.args(args).stdin(Stdio::null());

        let output = timeout(limit, command.output())
            .await
            .map_err(|_| EngineError::TimedOut {
                what: what.to_string(),
                seconds: limit.as_secs(),
            })?
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                what: what.to_string(),
                code: output.status.code().unwrap_or(-1),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::{Path, PathBuf};

    /// Write an executable stub engine script into `dir`. Tests point
    /// `Engine::with_binary` at the result instead of a real engine.
    pub fn stub_engine(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("engine-stub.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::stub_engine;
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_defaults_to_docker() {
        std::env::remove_var(RUNTIME_ENV);
        assert_eq!(Engine::from_env().binary(), DEFAULT_ENGINE);
    }

    #[test]
    #[serial]
    fn from_env_honors_runtime_override() {
        std::env::set_var(RUNTIME_ENV, "podman");
        assert_eq!(Engine::from_env().binary(), "podman");
        std::env::remove_var(RUNTIME_ENV);
    }

    #[tokio::test]
    async fn ping_succeeds_against_healthy_stub() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_engine(dir.path(), "exit 0");
        let engine = Engine::with_binary(stub.to_string_lossy());
        engine.ping().await.unwrap();
    }

    #[tokio::test]
    async fn failed_call_carries_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_engine(dir.path(), "echo 'daemon down' >&2; exit 7");
        let engine = Engine::with_binary(stub.to_string_lossy());

        let err = engine.ping().await.unwrap_err();
        match err {
            EngineError::Failed { code, detail, .. } => {
                assert_eq!(code, 7);
                assert_eq!(detail, "daemon down");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let engine = Engine::with_binary("/nonexistent/engine-binary");
        let err = engine.ping().await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn image_exists_reflects_inspect_status() {
        let dir = tempfile::tempdir().unwrap();

        let present = stub_engine(dir.path(), "exit 0");
        let engine = Engine::with_binary(present.to_string_lossy());
        assert!(engine.image_exists("burrow-session:latest").await.unwrap());

        let absent = stub_engine(dir.path(), "exit 1");
        let engine = Engine::with_binary(absent.to_string_lossy());
        assert!(!engine.image_exists("burrow-session:latest").await.unwrap());
    }
}
