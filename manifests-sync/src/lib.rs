//! # manifests-sync
//!
//! Reconciliation engine keeping a local manifests directory in step with
//! the head revision of a remote repository.
//!
//! Call [`pipeline::run`] with a [`RemoteSource`] (usually [`GitRemote`]) and
//! a [`pipeline::SyncRequest`] to perform one pass.

pub mod diff;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod reconcile;
pub mod remote;
pub mod snapshot;

pub use diff::{diff_changes, FileDiff};
pub use error::SyncError;
pub use git::GitRemote;
pub use pipeline::{SyncOutcome, SyncRequest};
pub use reconcile::{
    reconcile, Action, FilesystemPort, LocalFs, OutcomeStatus, PathOutcome, ReconcileOptions,
    ReconcileReport,
};
pub use remote::{MemorySource, RemoteEntry, RemoteSource, RemoteTree};
pub use snapshot::{build_deployed, build_desired, SkippedEntry};
pub use tokio_util::sync::CancellationToken;
