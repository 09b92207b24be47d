//! Snapshot builders for the desired (remote) and deployed (local) sides.
//!
//! Both builders run every path through the same [`FilterConfig`], so a path
//! either appears on both sides or is invisible to the reconciler.
//!
//! Entries that cannot be read are skipped rather than failing the pass.
//! A skip makes the path look absent, so each one is logged and returned in
//! `skipped` for the caller to act on.

use std::fs::File;
use std::path::{Path, PathBuf};

use manifests_core::{fingerprint_reader, FilterConfig, ManagedPath, ManifestRecord, Snapshot};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::remote::RemoteSource;

/// Which side an entry was skipped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Desired,
    Deployed,
}

/// An entry dropped from a snapshot because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub side: Side,
    /// Raw relative path as listed, which may not be a valid managed path.
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DesiredSnapshot {
    pub revision: String,
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone)]
pub struct DeployedSnapshot {
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedEntry>,
}

// ---------------------------------------------------------------------------
// Desired
// ---------------------------------------------------------------------------

/// Read the in-scope files of the remote head revision, contents included.
pub fn build_desired(
    source: &dyn RemoteSource,
    filter: &FilterConfig,
    cancel: &CancellationToken,
) -> Result<DesiredSnapshot, SyncError> {
    let tree = source.checkout_head()?;
    let revision = tree.revision().to_string();
    tracing::info!("resolved {} at revision {}", source.location(), revision);

    let mut snapshot = Snapshot::new();
    let mut skipped = Vec::new();

    for entry in tree.entries()? {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if !filter.in_scope(&entry.path) {
            tracing::trace!("out of scope (desired): {}", entry.path);
            continue;
        }

        let path = match ManagedPath::parse(&entry.path) {
            Ok(path) => path,
            Err(err) => {
                skipped.push(skip(Side::Desired, &entry.path, err.to_string()));
                continue;
            }
        };

        match tree.read(&entry) {
            Ok(contents) => {
                snapshot.insert(ManifestRecord::from_contents(path, contents));
            }
            Err(err) => skipped.push(skip(Side::Desired, &entry.path, err.to_string())),
        }
    }

    tracing::debug!(
        "desired snapshot: {} files, {} skipped",
        snapshot.len(),
        skipped.len()
    );
    Ok(DesiredSnapshot {
        revision,
        snapshot,
        skipped,
    })
}

// ---------------------------------------------------------------------------
// Deployed
// ---------------------------------------------------------------------------

/// Fingerprint the in-scope files currently under `root`.
///
/// `root` itself must be a readable directory; anything else means the
/// deployed state cannot be established and the pass must not proceed.
pub fn build_deployed(
    root: &Path,
    filter: &FilterConfig,
    cancel: &CancellationToken,
) -> Result<DeployedSnapshot, SyncError> {
    let unreadable = |source| SyncError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };
    let meta = std::fs::metadata(root).map_err(unreadable)?;
    if !meta.is_dir() {
        return Err(unreadable(std::io::Error::other("not a directory")));
    }
    std::fs::read_dir(root).map_err(unreadable)?;

    let mut snapshot = Snapshot::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let raw = err
                    .path()
                    .map(|p| relative_display(root, p))
                    .unwrap_or_default();
                skipped.push(skip(Side::Deployed, &raw, err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let raw = relative_display(root, entry.path());
        if !filter.in_scope(&raw) {
            tracing::trace!("out of scope (deployed): {raw}");
            continue;
        }
        let path = match ManagedPath::parse(&raw) {
            Ok(path) => path,
            Err(err) => {
                skipped.push(skip(Side::Deployed, &raw, err.to_string()));
                continue;
            }
        };

        let digest = File::open(entry.path()).and_then(fingerprint_reader);
        match digest {
            Ok((fingerprint, size)) => {
                snapshot.insert(ManifestRecord::without_contents(path, size, fingerprint));
            }
            Err(err) => skipped.push(skip(Side::Deployed, &raw, err.to_string())),
        }
    }

    tracing::debug!(
        "deployed snapshot: {} files, {} skipped",
        snapshot.len(),
        skipped.len()
    );
    Ok(DeployedSnapshot { snapshot, skipped })
}

/// POSIX-style path of `path` relative to `root`, no leading separator.
fn relative_display(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn skip(side: Side, path: &str, reason: String) -> SkippedEntry {
    tracing::warn!("skipping {path} ({side:?}): {reason}");
    SkippedEntry {
        side,
        path: path.to_string(),
        reason,
    }
}
