//! Error types for manifests-sync.
//!
//! Every variant here is fatal to a reconciliation pass and is raised before
//! any filesystem mutation. Per-path read, write and delete failures are not
//! errors at this level; they are recorded in the report instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached or cloned.
    #[error("remote {location} is unavailable: {source}")]
    RemoteUnavailable {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote was fetched but its head revision could not be resolved.
    #[error("could not resolve head revision of {location}: {reason}")]
    RevisionResolutionFailed { location: String, reason: String },

    /// Reading a single remote object failed.
    #[error("failed to read {path} from the remote: {reason}")]
    ReadFailed { path: String, reason: String },

    /// The managed root cannot be listed, so the deployed state is unknown.
    #[error("managed root {path} is unreadable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync pass cancelled")]
    Cancelled,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
