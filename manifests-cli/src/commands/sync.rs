//! `manifests-updater sync`: one reconciliation pass from the command line.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use manifests_sync::{
    pipeline::{self, SyncOutcome, SyncRequest},
    Action, CancellationToken, GitRemote, OutcomeStatus, PathOutcome,
};

use super::SourceArgs;

/// Arguments for `manifests-updater sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Report what would change without touching the directory.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the full report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Log progress to stderr (`RUST_LOG` controls the level).
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "result")]
    result: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        if self.verbose {
            manifests_daemon::init_tracing();
        }

        let config = self.source.load_config()?;
        let remote = GitRemote::new(config.git_repo_url.clone());
        let request = SyncRequest {
            root: config.manifests_dir.clone(),
            filter: config.filter.clone(),
            dry_run: self.dry_run,
        };

        let outcome = pipeline::run(&remote, &request, &CancellationToken::new())
            .with_context(|| format!("sync failed for '{}'", config.git_repo_url))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("failed to serialize sync report")?
            );
        } else {
            print_summary(&outcome);
        }

        if outcome.report.has_errors() {
            bail!("{} path(s) failed to apply", outcome.report.failed());
        }
        Ok(())
    }
}

fn print_summary(outcome: &SyncOutcome) {
    let report = &outcome.report;
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    let revision = outcome.revision.get(..12).unwrap_or(&outcome.revision);
    println!(
        "{prefix}{} revision {} ({}ms)",
        "✓".green().bold(),
        revision.bold(),
        outcome.duration_ms
    );
    println!(
        "  {} created, {} updated, {} unchanged, {} deleted, {} failed, {} skipped",
        report.created().to_string().green(),
        report.updated().to_string().yellow(),
        report.unchanged(),
        report.deleted().to_string().red(),
        report.failed().to_string().red().bold(),
        report.skipped.len(),
    );

    let rows: Vec<ChangeRow> = report
        .outcomes
        .iter()
        .filter(|o| o.action.is_mutation() || o.is_failed())
        .map(change_row)
        .collect();
    if rows.is_empty() {
        println!("{prefix}nothing to do");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for skipped in &report.skipped {
        println!(
            "  {} {} skipped: {}",
            "!".yellow().bold(),
            skipped.path,
            skipped.reason
        );
    }
    if report.cancelled {
        println!("{}", "pass was cancelled before finishing".yellow());
    }
}

fn change_row(outcome: &PathOutcome) -> ChangeRow {
    let action = match outcome.action {
        Action::Create => "create",
        Action::Update => "update",
        Action::Unchanged => "unchanged",
        Action::Delete => "delete",
    };
    let result = match &outcome.status {
        OutcomeStatus::Applied => "applied".to_string(),
        OutcomeStatus::Planned => "planned".to_string(),
        OutcomeStatus::Failed { error } => format!("failed: {error}"),
    };
    ChangeRow {
        action: action.to_string(),
        path: outcome.path.to_string(),
        size: outcome.size,
        result,
    }
}
