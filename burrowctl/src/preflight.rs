//! Host preconditions, checked fail-fast before anything external happens.
//!
//! These are environment-setup problems only the operator can fix, so every
//! error carries a remediation hint and nothing is retried.

use session::engine::{Engine, QUERY_TIMEOUT};
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

#[derive(Debug, Error)]
pub enum RequirementError {
    #[error(
        "container engine {binary:?} was not found; install it or point \
         BURROW_CONTAINER_RUNTIME at an engine binary"
    )]
    EngineMissing { binary: String },

    #[error("container engine daemon is not responding ({reason}); start the engine service and retry")]
    DaemonUnreachable { reason: String },

    #[error("git was not found on PATH; install git before launching a session")]
    GitMissing,

    #[error(
        "the current directory is not inside a version-controlled project; \
         run burrowctl from within a git checkout"
    )]
    NotARepository,

    #[error(
        "SSH_AUTH_SOCK is not set; start an ssh agent and add your key before \
         launching a session"
    )]
    AgentSocketUnset,

    #[error(
        "SSH_AUTH_SOCK points at {path:?}, which is not a live socket; \
         restart your ssh agent"
    )]
    AgentSocketDead { path: PathBuf },
}

/// Run the preflight sequence. Returns the verified agent socket path, the
/// one piece of host state later stages need.
pub async fn check_requirements(engine: &Engine) -> Result<PathBuf, RequirementError> {
    which::which(engine.binary()).map_err(|_| RequirementError::EngineMissing {
        binary: engine.binary().to_string(),
    })?;
    debug!(binary = engine.binary(), "container engine binary found");

    engine
        .ping()
        .await
        .map_err(|err| RequirementError::DaemonUnreachable {
            reason: err.to_string(),
        })?;
    debug!("container engine daemon reachable");

    ensure_inside_repository().await?;
    debug!("inside a version-controlled project");

    let socket = agent_socket()?;
    debug!(socket = %socket.display(), "agent socket verified");
    Ok(socket)
}

async fn ensure_inside_repository() -> Result<(), RequirementError> {
    let mut command = Command::new("git");
    command
        .args(["rev-parse", "--is-inside-work-tree"])
        .stdin(Stdio::null());

    let output = timeout(QUERY_TIMEOUT, command.output())
        .await
        .map_err(|_| RequirementError::NotARepository)?
        .map_err(|_| RequirementError::GitMissing)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() || stdout.trim() != "true" {
        return Err(RequirementError::NotARepository);
    }
    Ok(())
}

/// Resolve and verify the credential-agent socket from the environment.
pub fn agent_socket() -> Result<PathBuf, RequirementError> {
    let raw = std::env::var_os(AGENT_SOCKET_ENV)
        .filter(|value| !value.is_empty())
        .ok_or(RequirementError::AgentSocketUnset)?;

    let path = PathBuf::from(raw);
    let metadata =
        std::fs::metadata(&path).map_err(|_| RequirementError::AgentSocketDead {
            path: path.clone(),
        })?;
    if !metadata.file_type().is_socket() {
        return Err(RequirementError::AgentSocketDead { path });
    }
    Ok(path)
}
