//! Sync orchestrator: the single entry point shared by the CLI and daemon.
//!
//! A pass builds the desired snapshot, then the deployed snapshot, and only
//! then reconciles. Either build failing aborts the pass before anything on
//! disk changes.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use manifests_core::{FilterConfig, ManagedPath};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::reconcile::{reconcile, LocalFs, OutcomeStatus, ReconcileOptions, ReconcileReport};
use crate::remote::RemoteSource;
use crate::snapshot::{
    build_deployed, build_desired, DeployedSnapshot, DesiredSnapshot, Side, SkippedEntry,
};

/// Parameters for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Managed root directory.
    pub root: PathBuf,
    pub filter: FilterConfig,
    pub dry_run: bool,
}

/// Outcome of a pass that got as far as reconciling.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub revision: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub report: ReconcileReport,
}

/// Run one reconciliation pass of `source` into `request.root`.
pub fn run(
    source: &dyn RemoteSource,
    request: &SyncRequest,
    cancel: &CancellationToken,
) -> Result<SyncOutcome, SyncError> {
    let started_at = Utc::now();
    let started = Instant::now();
    tracing::info!(
        "sync started: {} -> {}",
        source.location(),
        request.root.display()
    );

    let desired = build_desired(source, &request.filter, cancel)?;
    let mut deployed = build_deployed(&request.root, &request.filter, cancel)?;
    protect_unreadable(&desired, &mut deployed);

    let options = ReconcileOptions {
        dry_run: request.dry_run,
        cancel: cancel.clone(),
    };
    let mut report = reconcile(
        &desired.snapshot,
        &deployed.snapshot,
        &LocalFs::new(&request.root),
        &options,
    );
    report.skipped = desired.skipped;
    report.skipped.extend(deployed.skipped);

    let outcome = SyncOutcome {
        revision: desired.revision,
        started_at,
        duration_ms: started.elapsed().as_millis(),
        report,
    };
    log_report(&outcome);
    Ok(outcome)
}

/// Drop from `deployed` every path whose remote copy could not be read.
///
/// A desired entry that failed to read says nothing about whether the local
/// copy is stale, so its local counterpart is left alone this pass.
pub(crate) fn protect_unreadable(
    desired: &DesiredSnapshot,
    deployed: &mut DeployedSnapshot,
) {
    for entry in desired.skipped.iter().filter(|e| e.side == Side::Desired) {
        if let Ok(path) = ManagedPath::parse(&entry.path) {
            if deployed.snapshot.remove(&path).is_some() {
                tracing::warn!("keeping {path} as deployed: remote copy unreadable this pass");
            }
        }
    }
}

/// Emit the per-path outcomes of a finished pass.
pub fn log_report(outcome: &SyncOutcome) {
    let report = &outcome.report;
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    for o in &report.outcomes {
        match &o.status {
            OutcomeStatus::Applied if o.action.is_mutation() => {
                tracing::info!("{prefix}{:?}: {}", o.action, o.path)
            }
            OutcomeStatus::Applied => tracing::debug!("unchanged: {}", o.path),
            OutcomeStatus::Planned => tracing::info!("{prefix}would {:?}: {}", o.action, o.path),
            OutcomeStatus::Failed { error } => {
                tracing::warn!("{:?} failed for {}: {error}", o.action, o.path)
            }
        }
    }
    for SkippedEntry { side, path, reason } in &report.skipped {
        tracing::warn!("skipped {path} ({side:?}): {reason}");
    }
    if report.cancelled {
        tracing::warn!("sync cancelled before all paths were visited");
    }

    tracing::info!(
        "{prefix}sync finished at {} in {}ms: {} created, {} updated, {} unchanged, {} deleted, {} failed, {} skipped",
        short_revision(&outcome.revision),
        outcome.duration_ms,
        report.created(),
        report.updated(),
        report.unchanged(),
        report.deleted(),
        report.failed(),
        report.skipped.len(),
    );
}

fn short_revision(revision: &str) -> &str {
    revision.get(..7).unwrap_or(revision)
}
