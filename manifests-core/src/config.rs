//! Process configuration read once at startup from the environment.
//!
//! | variable             | default                                   |
//! |----------------------|-------------------------------------------|
//! | `PORT`               | `18092`                                   |
//! | `GIT_REPO_URL`       | required                                  |
//! | `MANIFESTS_DIR`      | `/var/lib/rancher/k3s/server/manifests`   |
//! | `SYNC_TIMEOUT_SECS`  | `120`                                     |
//! | `MANIFESTS_IGNORE`   | k3s bundled add-ons (comma separated)     |
//! | `MANIFESTS_SUFFIXES` | `.yaml,.yml,.json` (comma separated)      |
//!
//! Empty values are treated as unset.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::filter::{FilterConfig, K3S_ALLOWED_SUFFIXES, K3S_IGNORE_PREFIXES};

pub const DEFAULT_PORT: u16 = 18092;
pub const DEFAULT_MANIFESTS_DIR: &str = "/var/lib/rancher/k3s/server/manifests";
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub git_repo_url: String,
    pub manifests_dir: PathBuf,
    pub sync_timeout: Duration,
    pub filter: FilterConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let port = match get("PORT") {
            None => DEFAULT_PORT,
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|err| ConfigError::InvalidPort {
                    reason: err.to_string(),
                    value,
                })?,
        };

        let git_repo_url = get("GIT_REPO_URL").ok_or(ConfigError::MissingRepoUrl)?;

        let manifests_dir = get("MANIFESTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFESTS_DIR));

        let sync_timeout = match get("SYNC_TIMEOUT_SECS") {
            None => DEFAULT_SYNC_TIMEOUT,
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidTimeout {
                        value,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(secs) => Duration::from_secs(secs),
                Err(err) => {
                    return Err(ConfigError::InvalidTimeout {
                        reason: err.to_string(),
                        value,
                    })
                }
            },
        };

        let ignore_prefixes = get("MANIFESTS_IGNORE")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| K3S_IGNORE_PREFIXES.iter().map(|s| s.to_string()).collect());
        let allowed_suffixes = get("MANIFESTS_SUFFIXES")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| K3S_ALLOWED_SUFFIXES.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            port,
            git_repo_url,
            manifests_dir,
            sync_timeout,
            filter: FilterConfig::new(ignore_prefixes, allowed_suffixes),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
