//! Assembly of the container launch specification.
//!
//! The spec enumerates flags, mounts and environment pairs as structured
//! data and is serialized to engine arguments only at the spawn boundary.
//! Every environment value and mount source is either a validated input or
//! a process-controlled constant.

use chrono::Utc;
use config_probe::DiscoveredConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;
use vet::RepositoryReference;

/// Fixed in-container location of the forwarded agent socket.
pub const AGENT_SOCKET_GUEST_PATH: &str = "/run/burrow/ssh-agent.sock";

const WORKSPACE_TARGET: &str = "/workspace";
const STATE_TARGET: &str = "/state";
const STAGE_SSH_TARGET: &str = "/mnt/host/ssh";
const STAGE_GITCONFIG_TARGET: &str = "/mnt/host/gitconfig";
const STAGE_CONFIG_TARGET: &str = "/mnt/host/config";
const STAGE_SHARE_TARGET: &str = "/mnt/host/share";

/// Capabilities retained after `--cap-drop ALL`: the minimum the bootstrap
/// needs to chown staged files and switch to the session user.
const RETAINED_CAPABILITIES: &[&str] = &["CHOWN", "DAC_OVERRIDE", "FOWNER", "SETGID", "SETUID"];

/// Host credential material forwarded by reference. The orchestrator never
/// reads any of these paths itself.
#[derive(Debug, Clone, Serialize)]
pub struct HostCredentials {
    /// Live agent socket, from `SSH_AUTH_SOCK`.
    pub agent_socket: PathBuf,
    /// Optional `~/.ssh`, offered read-only as a bootstrap fallback.
    pub ssh_dir: Option<PathBuf>,
    /// Optional `~/.gitconfig`, mounted read-only.
    pub git_identity: Option<PathBuf>,
}

impl HostCredentials {
    /// Probe the host home directory for optional credential-adjacent
    /// mounts around an already-verified agent socket.
    pub fn detect(agent_socket: PathBuf) -> Self {
        let home = dirs::home_dir();
        let ssh_dir = home
            .as_ref()
            .map(|h| h.join(".ssh"))
            .filter(|p| p.is_dir());
        let git_identity = home
            .as_ref()
            .map(|h| h.join(".gitconfig"))
            .filter(|p| p.is_file());
        Self {
            agent_socket,
            ssh_dir,
            git_identity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// The fully assembled container invocation. Built once, never mutated
/// after spawn.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchSpec {
    pub image: String,
    pub session_id: String,
    pub container_name: String,
    pub state_volume: String,
    pub workspace_volume: String,
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    /// Whether to request a pseudo-terminal at spawn.
    pub tty: bool,
}

impl LaunchSpec {
    pub fn assemble(
        image: &str,
        repository: &RepositoryReference,
        config: &DiscoveredConfig,
        credentials: &HostCredentials,
        tty: bool,
    ) -> Self {
        let session_id = generate_session_id();
        let container_name = format!("burrow-{session_id}");
        let state_volume = format!("burrow-{session_id}-state");
        let workspace_volume = format!("burrow-{session_id}-workspace");

        let mut mounts = Vec::new();
        let mut env = BTreeMap::new();

        env.insert("REPO_URL".to_string(), repository.url.to_string());
        env.insert("REPO_NAME".to_string(), repository.name.to_string());
        env.insert("REPO_BRANCH".to_string(), repository.branch.to_string());

        // Agent socket forwarded by reference. Read-write because connecting
        // to a unix socket requires write permission on the inode; no key
        // material crosses the boundary.
        mounts.push(Mount {
            source: credentials.agent_socket.clone(),
            target: AGENT_SOCKET_GUEST_PATH.to_string(),
            read_only: false,
        });
        env.insert(
            "SSH_AUTH_SOCK".to_string(),
            AGENT_SOCKET_GUEST_PATH.to_string(),
        );

        if let Some(ssh_dir) = &credentials.ssh_dir {
            mounts.push(Mount {
                source: ssh_dir.clone(),
                target: STAGE_SSH_TARGET.to_string(),
                read_only: true,
            });
            env.insert(
                "BURROW_HOST_SSH_DIR".to_string(),
                STAGE_SSH_TARGET.to_string(),
            );
        }

        if let Some(git_identity) = &credentials.git_identity {
            mounts.push(Mount {
                source: git_identity.clone(),
                target: STAGE_GITCONFIG_TARGET.to_string(),
                read_only: true,
            });
            env.insert(
                "BURROW_HOST_GITCONFIG".to_string(),
                STAGE_GITCONFIG_TARGET.to_string(),
            );
        }

        if let Some(config_dir) = config.config() {
            mounts.push(Mount {
                source: config_dir.to_path_buf(),
                target: STAGE_CONFIG_TARGET.to_string(),
                read_only: true,
            });
            env.insert(
                "BURROW_HOST_CONFIG_DIR".to_string(),
                STAGE_CONFIG_TARGET.to_string(),
            );
        }

        if let Some(share_dir) = config.share() {
            mounts.push(Mount {
                source: share_dir.to_path_buf(),
                target: STAGE_SHARE_TARGET.to_string(),
                read_only: true,
            });
            env.insert(
                "BURROW_HOST_SHARE_DIR".to_string(),
                STAGE_SHARE_TARGET.to_string(),
            );
        }

        Self {
            image: image.to_string(),
            session_id,
            container_name,
            state_volume,
            workspace_volume,
            mounts,
            env,
            tty,
        }
    }

    /// Serialize the spec to `run` arguments. This is the only place the
    /// structured data becomes a process argument list.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
            "--cap-drop".to_string(),
            "ALL".to_string(),
        ];

        for capability in RETAINED_CAPABILITIES {
            args.push("--cap-add".to_string());
            args.push((*capability).to_string());
        }

        args.push("--mount".to_string());
        args.push(format!(
            "type=volume,source={},target={}",
            self.state_volume, STATE_TARGET
        ));
        args.push("--mount".to_string());
        args.push(format!(
            "type=volume,source={},target={}",
            self.workspace_volume, WORKSPACE_TARGET
        ));

        for mount in &self.mounts {
            args.push("--mount".to_string());
            args.push(format!(
                "type=bind,source={},target={},readonly={}",
                mount.source.display(),
                mount.target,
                mount.read_only
            ));
        }

        for (key, value) in &self.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }

        args.push("--workdir".to_string());
        args.push(WORKSPACE_TARGET.to_string());

        args.push("--interactive".to_string());
        if self.tty {
            args.push("--tty".to_string());
        }

        args.push(self.image.clone());
        args
    }
}

/// Time-based session identifier with a random suffix so concurrent runs in
/// the same second cannot collide.
fn generate_session_id() -> String {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &suffix[..8])
}
