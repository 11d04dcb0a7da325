//! Discovery of optional host-side tool configuration.
//!
//! Probes a fixed, ordered list of directories under the operator's home for
//! configuration the in-container bootstrap can copy into place. Absence is
//! never an error; the session falls back to the image's bundled defaults.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Logical roles a discovered directory can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Persistent tool data (`~/.local/share/burrow`).
    Share,
    /// Primary configuration (`~/.config/burrow`).
    Config,
    /// Legacy dot-directory (`~/.burrow`), promoted to `Config` when the
    /// primary location is absent.
    Alternative,
}

/// Candidate locations relative to the home directory, probed in order.
pub const CANDIDATES: &[(Category, &str)] = &[
    (Category::Share, ".local/share/burrow"),
    (Category::Config, ".config/burrow"),
    (Category::Alternative, ".burrow"),
];

/// Result of a discovery pass. Computed once per run, read-only afterwards.
/// Paths are recorded only if they existed at probe time; a later disappearance
/// surfaces as a mount failure at launch, which is acceptable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveredConfig {
    share: Option<PathBuf>,
    config: Option<PathBuf>,
    alternative: Option<PathBuf>,
    /// Every candidate that existed, in probe order.
    pub found: Vec<PathBuf>,
}

impl DiscoveredConfig {
    /// Probe the operator's home directory.
    pub fn discover() -> Self {
        match dirs::home_dir() {
            Some(home) => Self::discover_in(&home),
            None => {
                warn!("could not determine a home directory; skipping config discovery");
                Self::default()
            }
        }
    }

    /// Probe candidates under an explicit base directory.
    pub fn discover_in(base: &Path) -> Self {
        let mut result = Self::default();

        for (category, relative) in CANDIDATES {
            let path = base.join(relative);
            if !path.is_dir() {
                continue;
            }
            debug!(category = ?category, path = %path.display(), "found host config");
            result.found.push(path.clone());
            match category {
                Category::Share => result.share = Some(path),
                Category::Config => result.config = Some(path),
                Category::Alternative => result.alternative = Some(path),
            }
        }

        // First-found-wins substitution: a legacy dot-directory stands in for
        // the primary config location when that location is absent.
        if result.config.is_none() {
            if let Some(alternative) = &result.alternative {
                debug!(
                    path = %alternative.display(),
                    "promoting alternative location to primary config"
                );
                result.config = Some(alternative.clone());
            }
        }

        if result.found.is_empty() {
            warn!("no host configuration found; the session will use bundled defaults");
        }

        result
    }

    pub fn share(&self) -> Option<&Path> {
        self.share.as_deref()
    }

    /// The effective primary config directory, after promotion.
    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_home_discovers_nothing() {
        let home = tempfile::tempdir().unwrap();
        let result = DiscoveredConfig::discover_in(home.path());
        assert!(result.is_empty());
        assert!(result.share().is_none());
        assert!(result.config().is_none());
    }

    #[test]
    fn primary_locations_are_classified() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(".local/share/burrow")).unwrap();
        fs::create_dir_all(home.path().join(".config/burrow")).unwrap();

        let result = DiscoveredConfig::discover_in(home.path());
        assert_eq!(result.share().unwrap(), home.path().join(".local/share/burrow"));
        assert_eq!(result.config().unwrap(), home.path().join(".config/burrow"));
        assert_eq!(result.found.len(), 2);
    }

    #[test]
    fn alternative_is_promoted_when_primary_config_absent() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(".burrow")).unwrap();

        let result = DiscoveredConfig::discover_in(home.path());
        assert_eq!(result.config().unwrap(), home.path().join(".burrow"));
    }

    #[test]
    fn primary_config_wins_over_alternative() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(".config/burrow")).unwrap();
        fs::create_dir_all(home.path().join(".burrow")).unwrap();

        let result = DiscoveredConfig::discover_in(home.path());
        assert_eq!(result.config().unwrap(), home.path().join(".config/burrow"));
        assert_eq!(result.found.len(), 2);
    }

    #[test]
    fn plain_files_do_not_count_as_config_dirs() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(".config")).unwrap();
        fs::write(home.path().join(".config/burrow"), "not a dir").unwrap();

        let result = DiscoveredConfig::discover_in(home.path());
        assert!(result.config().is_none());
    }
}
