//! `manifests-updater trigger`: ask a running daemon for a pass.

use anyhow::{bail, Context, Result};
use clap::Args;

use manifests_core::config::DEFAULT_PORT;

/// Arguments for `manifests-updater trigger`.
#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Update endpoint of the daemon. Defaults to localhost on `PORT`.
    #[arg(long)]
    pub url: Option<String>,
}

impl TriggerArgs {
    pub fn run(self) -> Result<()> {
        let url = self.url.unwrap_or_else(default_url);

        let response = match ureq::post(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                bail!("daemon at {url} answered {code}: {}", body.trim());
            }
            Err(err) => bail!("failed to reach {url}: {err}"),
        };

        let body: serde_json::Value = response
            .into_json()
            .context("daemon returned a non-JSON body")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("failed to render response JSON")?
        );
        Ok(())
    }
}

fn default_url() -> String {
    let port = std::env::var("PORT")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    format!("http://127.0.0.1:{port}/api/v1/update")
}
