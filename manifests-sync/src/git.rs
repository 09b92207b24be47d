//! Git adapter for [`RemoteSource`].
//!
//! Each checkout performs a fresh bare clone into a scratch directory that
//! lives as long as the returned tree. Nothing is cached between passes, so
//! every pass sees the remote's head as of that pass.

use git2::build::RepoBuilder;
use git2::{ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use tempfile::TempDir;

use crate::error::{io_err, SyncError};
use crate::remote::{RemoteEntry, RemoteSource, RemoteTree};

/// Git file mode for symbolic links.
const FILEMODE_LINK: i32 = 0o120000;

#[derive(Debug, Clone)]
pub struct GitRemote {
    url: String,
}

impl GitRemote {
    /// `url` may be anything libgit2 can clone: https, ssh, `file://` or a
    /// plain local path.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl RemoteSource for GitRemote {
    fn location(&self) -> &str {
        &self.url
    }

    fn checkout_head(&self) -> Result<Box<dyn RemoteTree>, SyncError> {
        let scratch = tempfile::Builder::new()
            .prefix("manifests-clone-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;

        tracing::debug!("cloning {} into {}", self.url, scratch.path().display());
        let repo = RepoBuilder::new()
            .bare(true)
            .clone(&self.url, scratch.path())
            .map_err(|e| SyncError::RemoteUnavailable {
                location: self.url.clone(),
                source: Box::new(e),
            })?;

        let resolution = |e: git2::Error| SyncError::RevisionResolutionFailed {
            location: self.url.clone(),
            reason: e.message().to_string(),
        };
        let (commit_id, tree_id) = {
            let head = repo.head().map_err(resolution)?;
            let commit = head.peel_to_commit().map_err(resolution)?;
            let tree_id = commit.tree_id();
            (commit.id(), tree_id)
        };

        Ok(Box::new(GitTree {
            repo,
            _scratch: scratch,
            location: self.url.clone(),
            revision: commit_id.to_string(),
            tree_id,
        }))
    }
}

struct GitTree {
    repo: Repository,
    // Dropped after `repo`, removing the clone from disk.
    _scratch: TempDir,
    location: String,
    revision: String,
    tree_id: Oid,
}

impl RemoteTree for GitTree {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn entries(&self) -> Result<Vec<RemoteEntry>, SyncError> {
        let resolution = |e: git2::Error| SyncError::RevisionResolutionFailed {
            location: self.location.clone(),
            reason: e.message().to_string(),
        };
        let tree = self.repo.find_tree(self.tree_id).map_err(resolution)?;
        let odb = self.repo.odb().map_err(resolution)?;

        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() != Some(ObjectType::Blob) || entry.filemode() == FILEMODE_LINK {
                return TreeWalkResult::Ok;
            }
            let name = String::from_utf8_lossy(entry.name_bytes());
            let path = format!("{root}{name}");
            let size = match odb.read_header(entry.id()) {
                Ok((size, _)) => size as u64,
                Err(err) => {
                    tracing::debug!("no object header for {path}: {}", err.message());
                    0
                }
            };
            entries.push(RemoteEntry {
                path,
                size,
                id: entry.id().to_string(),
            });
            TreeWalkResult::Ok
        })
        .map_err(resolution)?;

        Ok(entries)
    }

    fn read(&self, entry: &RemoteEntry) -> Result<Vec<u8>, SyncError> {
        let read_failed = |e: git2::Error| SyncError::ReadFailed {
            path: entry.path.clone(),
            reason: e.message().to_string(),
        };
        let oid = Oid::from_str(&entry.id).map_err(read_failed)?;
        let blob = self.repo.find_blob(oid).map_err(read_failed)?;
        Ok(blob.content().to_vec())
    }
}
