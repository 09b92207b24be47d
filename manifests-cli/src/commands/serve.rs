//! `manifests-updater serve`: run the daemon in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use manifests_core::Config;
use manifests_daemon::start_blocking;

/// Arguments for `manifests-updater serve`. All settings come from the environment.
#[derive(Args, Debug)]
pub struct ServeArgs {}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let config = Config::from_env().context("invalid configuration")?;
        start_blocking(config).context("daemon exited with error")?;
        Ok(())
    }
}
