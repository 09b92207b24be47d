//! manifests-updater: keep a k3s manifests directory in step with a git repository.
//!
//! # Usage
//!
//! ```text
//! manifests-updater serve
//! manifests-updater sync [--repo <url>] [--dir <path>] [--dry-run] [--json]
//! manifests-updater diff [--repo <url>] [--dir <path>]
//! manifests-updater trigger [--url <url>]
//! ```
//!
//! Settings not given as flags come from the environment (`GIT_REPO_URL`,
//! `MANIFESTS_DIR`, `PORT`, `SYNC_TIMEOUT_SECS`, `MANIFESTS_IGNORE`,
//! `MANIFESTS_SUFFIXES`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, serve::ServeArgs, sync::SyncArgs, trigger::TriggerArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "manifests-updater",
    version,
    about = "Reconcile a local manifests directory with the head of a git repository",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP-triggered daemon.
    Serve(ServeArgs),

    /// Run one reconciliation pass and exit.
    Sync(SyncArgs),

    /// Show unified diffs of what a pass would change.
    Diff(DiffArgs),

    /// Ask a running daemon to sync.
    Trigger(TriggerArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Trigger(args) => args.run(),
    }
}
