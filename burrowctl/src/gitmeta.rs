//! Repository reference harvesting from the host checkout.
//!
//! Everything git reports here is untrusted: a hostile repository controls
//! its own remote URL. The raw strings go straight through the validators
//! and only the resulting [`RepositoryReference`] leaves this module.

use anyhow::{anyhow, bail, Context, Result};
use session::engine::QUERY_TIMEOUT;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use vet::RepositoryReference;

/// Build the validated reference for the repository containing the current
/// working directory.
pub async fn repository_reference() -> Result<RepositoryReference> {
    let cwd = std::env::current_dir().context("could not determine the current directory")?;
    repository_reference_in(&cwd).await
}

pub async fn repository_reference_in(dir: &Path) -> Result<RepositoryReference> {
    let url_raw = git_stdout(dir, &["remote", "get-url", "origin"])
        .await
        .context("could not read the origin remote of this project")?;
    let branch_raw = git_stdout(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .context("could not determine the current branch")?;
    if branch_raw == "HEAD" {
        bail!("the checkout is in detached HEAD state; check out a branch before launching a session");
    }

    let url = vet::vet_url(&url_raw)?;
    let branch = vet::vet_branch(&branch_raw)?;
    let name = vet::infer_name(&url)?;

    Ok(RepositoryReference { url, name, branch })
}

async fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let mut command = Command::new("git");
    command.args(args).current_dir(dir).stdin(Stdio::null());

    let output = timeout(QUERY_TIMEOUT, command.output())
        .await
        .map_err(|_| anyhow!("git {} timed out", args.join(" ")))?
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
