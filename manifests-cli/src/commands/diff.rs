//! `manifests-updater diff`: show unified diffs of pending changes.

use anyhow::{Context, Result};
use clap::Args;

use manifests_sync::{diff_changes, GitRemote};

use super::SourceArgs;

/// Arguments for `manifests-updater diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let config = self.source.load_config()?;
        let remote = GitRemote::new(config.git_repo_url.clone());

        let diffs = diff_changes(&remote, &config.manifests_dir, &config.filter)
            .with_context(|| format!("diff failed for '{}'", config.git_repo_url))?;

        if diffs.is_empty() {
            println!(
                "No differences for '{}'.",
                config.manifests_dir.display()
            );
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
