//! Validators for the untrusted strings that cross the container boundary.
//!
//! Everything the launcher learns from the host checkout (origin URL, branch,
//! repository name) is attacker-influenced: a cloned repository controls its
//! own `.git/config`. Each validator either returns a trusted newtype or a
//! [`VetError`] naming the violated rule. Allow-lists (schemes, hostnames,
//! character classes) are the primary defense; the shell-metacharacter
//! block-list is a redundant second layer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Characters with meaning to a shell or process argument parser. Rejected in
/// every field regardless of the allow-list outcome.
pub const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

/// Hostnames a repository may be cloned from. Exact match, no subdomains.
pub const ALLOWED_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "codeberg.org",
];

const ALLOWED_SCHEMES: &[&str] = &["https", "ssh", "git"];

const MAX_BRANCH_LEN: usize = 250;
const MAX_NAME_LEN: usize = 100;

// Glob and git-ref metacharacters rejected in branch names on top of the
// shell set.
const BRANCH_FORBIDDEN: &[char] = &['*', '?', '~', '^', ':', '\\', '\'', '"', '!'];

static SCP_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@([A-Za-z0-9][A-Za-z0-9.-]*):([A-Za-z0-9._/-]+)$")
        .expect("scp syntax pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VetError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} contains forbidden character {ch:?}")]
    ForbiddenCharacter { field: &'static str, ch: char },

    #[error("{field} exceeds the maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must not begin with {ch:?}")]
    ForbiddenPrefix { field: &'static str, ch: char },

    #[error("{field} must not end with {ch:?}")]
    ForbiddenSuffix { field: &'static str, ch: char },

    #[error("{field} contains a path traversal sequence")]
    Traversal { field: &'static str },

    #[error("repository URL scheme {scheme:?} is not allowed (use https, ssh or git)")]
    SchemeNotAllowed { scheme: String },

    #[error("repository host {host:?} is not on the allow-list")]
    HostNotAllowed { host: String },

    #[error("repository URL is neither a well-formed URL nor user@host:path syntax")]
    UnrecognizedUrl,
}

macro_rules! vetted_string {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

vetted_string!(
    /// A clone URL that passed [`vet_url`].
    RepoUrl
);
vetted_string!(
    /// A repository name that passed [`vet_name`].
    RepoName
);
vetted_string!(
    /// A branch name that passed [`vet_branch`].
    RepoBranch
);

/// A fully validated repository reference. Every field has passed its
/// validator; there is no other way to obtain the inner values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryReference {
    pub url: RepoUrl,
    pub name: RepoName,
    pub branch: RepoBranch,
}

impl RepositoryReference {
    pub fn vet(url: &str, name: &str, branch: &str) -> Result<Self, VetError> {
        Ok(Self {
            url: vet_url(url)?,
            name: vet_name(name)?,
            branch: vet_branch(branch)?,
        })
    }
}

fn reject_shell_metacharacters(field: &'static str, value: &str) -> Result<(), VetError> {
    for ch in value.chars() {
        if SHELL_METACHARACTERS.contains(&ch) || ch.is_control() {
            return Err(VetError::ForbiddenCharacter { field, ch });
        }
    }
    Ok(())
}

/// Validate a clone URL.
///
/// Accepts `https`/`ssh`/`git` URLs and SCP-style `user@host:path` syntax,
/// in both cases only for hosts on [`ALLOWED_HOSTS`].
pub fn vet_url(raw: &str) -> Result<RepoUrl, VetError> {
    let field = "repository URL";
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VetError::Empty { field });
    }

    reject_shell_metacharacters(field, trimmed)?;
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            return Err(VetError::ForbiddenCharacter { field, ch });
        }
    }

    if let Ok(parsed) = Url::parse(trimmed) {
        let scheme = parsed.scheme();
        if !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(VetError::SchemeNotAllowed {
                scheme: scheme.to_string(),
            });
        }
        let host = parsed.host_str().ok_or(VetError::UnrecognizedUrl)?;
        if !ALLOWED_HOSTS.contains(&host) {
            return Err(VetError::HostNotAllowed {
                host: host.to_string(),
            });
        }
        return Ok(RepoUrl(trimmed.to_string()));
    }

    // Not URL syntax; the only other accepted shape is scp-style
    // `user@host:path`, matched strictly.
    if let Some(captures) = SCP_SYNTAX.captures(trimmed) {
        let host = &captures[1];
        let path = &captures[2];
        if !ALLOWED_HOSTS.contains(&host) {
            return Err(VetError::HostNotAllowed {
                host: host.to_string(),
            });
        }
        if path.contains("..") {
            return Err(VetError::Traversal { field });
        }
        return Ok(RepoUrl(trimmed.to_string()));
    }

    Err(VetError::UnrecognizedUrl)
}

/// Validate a branch name. Returns the trimmed string.
pub fn vet_branch(raw: &str) -> Result<RepoBranch, VetError> {
    let field = "branch name";
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VetError::Empty { field });
    }
    if trimmed.len() > MAX_BRANCH_LEN {
        return Err(VetError::TooLong {
            field,
            max: MAX_BRANCH_LEN,
        });
    }

    reject_shell_metacharacters(field, trimmed)?;
    for ch in trimmed.chars() {
        if ch.is_whitespace() || BRANCH_FORBIDDEN.contains(&ch) {
            return Err(VetError::ForbiddenCharacter { field, ch });
        }
    }

    if trimmed.starts_with('-') {
        // `-`-prefixed refs read as flags when handed to git.
        return Err(VetError::ForbiddenPrefix { field, ch: '-' });
    }
    if trimmed.ends_with('.') {
        return Err(VetError::ForbiddenSuffix { field, ch: '.' });
    }
    if trimmed.contains("..") {
        return Err(VetError::Traversal { field });
    }

    Ok(RepoBranch(trimmed.to_string()))
}

/// Validate a repository name: `[A-Za-z0-9._-]+`, no leading dot, no `..`.
pub fn vet_name(raw: &str) -> Result<RepoName, VetError> {
    let field = "repository name";
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VetError::Empty { field });
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(VetError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }

    for ch in trimmed.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(VetError::ForbiddenCharacter { field, ch });
        }
    }

    if trimmed.starts_with('.') {
        return Err(VetError::ForbiddenPrefix { field, ch: '.' });
    }
    if trimmed.contains("..") {
        return Err(VetError::Traversal { field });
    }

    Ok(RepoName(trimmed.to_string()))
}

/// Derive the repository name from a validated clone URL: the last path
/// segment with any `.git` suffix removed, re-validated as a name.
pub fn infer_name(url: &RepoUrl) -> Result<RepoName, VetError> {
    let raw = url.as_str();
    let tail = raw
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    let stem = tail.strip_suffix(".git").unwrap_or(tail);
    vet_name(stem)
}
