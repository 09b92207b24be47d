pub mod diff;
pub mod serve;
pub mod sync;
pub mod trigger;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use manifests_core::Config;

/// Flags overriding the environment for one-shot commands.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Repository to read from (defaults to `GIT_REPO_URL`).
    #[arg(long)]
    pub repo: Option<String>,

    /// Managed manifests directory (defaults to `MANIFESTS_DIR`).
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

impl SourceArgs {
    pub fn load_config(&self) -> Result<Config> {
        let dir = self.dir.as_ref().map(|d| d.to_string_lossy().into_owned());
        Config::from_lookup(|key| match key {
            "GIT_REPO_URL" if self.repo.is_some() => self.repo.clone(),
            "MANIFESTS_DIR" if dir.is_some() => dir.clone(),
            _ => std::env::var(key).ok(),
        })
        .context("invalid configuration")
    }
}
