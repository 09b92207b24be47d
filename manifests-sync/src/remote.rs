//! Remote source port.
//!
//! The engine only needs "the files of the current head revision". A
//! [`RemoteSource`] hands out a [`RemoteTree`] for that revision, which can
//! list its files and read them one at a time. [`crate::git::GitRemote`] is
//! the production adapter; [`MemorySource`] serves fixed content.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;

/// A file listed at the head revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Path relative to the repository root, `/` separated.
    pub path: String,
    /// Size as reported by the listing.
    pub size: u64,
    /// Opaque object id understood by the tree that produced the entry.
    pub id: String,
}

pub trait RemoteSource: Send + Sync {
    /// Human-readable location, used in errors and logs.
    fn location(&self) -> &str;

    /// Resolve the current head revision and expose its file tree.
    fn checkout_head(&self) -> Result<Box<dyn RemoteTree>, SyncError>;
}

pub trait RemoteTree: Send {
    /// Identity of the resolved revision (commit id for git).
    fn revision(&self) -> &str;

    fn entries(&self) -> Result<Vec<RemoteEntry>, SyncError>;

    fn read(&self, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError>;
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Remote backed by an in-memory file map.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    location: String,
    revision: String,
    files: BTreeMap<String, Vec<u8>>,
    unreadable: BTreeSet<String>,
    unavailable: bool,
}

impl MemorySource {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            location: "memory".to_string(),
            revision: revision.into(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// List `path` but fail every read of it.
    pub fn with_unreadable(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.files.entry(path.clone()).or_default();
        self.unreadable.insert(path);
        self
    }

    /// Fail `checkout_head` as if the remote could not be reached.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

impl RemoteSource for MemorySource {
    fn location(&self) -> &str {
        &self.location
    }

    fn checkout_head(&self) -> Result<Box<dyn RemoteTree>, SyncError> {
        if self.unavailable {
            return Err(SyncError::RemoteUnavailable {
                location: self.location.clone(),
                source: "remote marked unavailable".into(),
            });
        }
        Ok(Box::new(MemoryTree {
            revision: self.revision.clone(),
            files: self.files.clone(),
            unreadable: self.unreadable.clone(),
        }))
    }
}

struct MemoryTree {
    revision: String,
    files: BTreeMap<String, Vec<u8>>,
    unreadable: BTreeSet<String>,
}

impl RemoteTree for MemoryTree {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn entries(&self) -> Result<Vec<RemoteEntry>, SyncError> {
        Ok(self
            .files
            .iter()
            .map(|(path, contents)| RemoteEntry {
                path: path.clone(),
                size: contents.len() as u64,
                id: path.clone(),
            })
            .collect())
    }

    fn read(&self, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError> {
        if self.unreadable.contains(&entry.id) {
            return Err(SyncError::ReadFailed {
                path: entry.path.clone(),
                reason: "object marked unreadable".to_string(),
            });
        }
        self.files
            .get(&entry.id)
            .cloned()
            .ok_or_else(|| SyncError::ReadFailed {
                path: entry.path.clone(),
                reason: "object not found".to_string(),
            })
    }
}
