//! Diff-and-apply between a desired and a deployed snapshot.
//!
//! Every path in the union of both snapshots is classified exactly once:
//!
//! | desired | deployed | fingerprints | action    |
//! |---------|----------|--------------|-----------|
//! | yes     | no       | -            | create    |
//! | yes     | yes      | differ       | update    |
//! | yes     | yes      | equal        | unchanged |
//! | no      | yes      | -            | delete    |
//!
//! Sizes are carried for diagnostics only; equality is decided by
//! fingerprint alone. Failures on one path are recorded and the pass moves
//! on to the next.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use manifests_core::{Fingerprint, ManagedPath, Snapshot};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::snapshot::SkippedEntry;

/// Suffix of the temporary sibling written before the rename into place.
pub const TMP_SUFFIX: &str = ".manifests.tmp";

// ---------------------------------------------------------------------------
// Filesystem port
// ---------------------------------------------------------------------------

/// Mutations the reconciler needs from the managed directory.
pub trait FilesystemPort {
    /// Replace the file at `path` with `contents`, creating parents.
    fn write(&self, path: &ManagedPath, contents: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &ManagedPath) -> io::Result<()>;
}

/// The managed root on the local filesystem.
///
/// Writes are atomic for concurrent readers: contents go to a hidden
/// temporary file next to the target, which is then renamed over it.
/// Removals prune directories left empty, up to but excluding the root.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FilesystemPort for LocalFs {
    fn write(&self, path: &ManagedPath, contents: &[u8]) -> io::Result<()> {
        let target = path.to_local(&self.root);
        atomic_write(&target, &tmp_path_for(&target), contents)
    }

    fn remove(&self, path: &ManagedPath) -> io::Result<()> {
        let target = path.to_local(&self.root);
        std::fs::remove_file(&target)?;
        prune_empty_parents(&self.root, &target);
        Ok(())
    }
}

/// `<dir>/.<name>.manifests.tmp` for a target `<dir>/<name>`.
pub(crate) fn tmp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{TMP_SUFFIX}"))
}

fn atomic_write(target: &Path, tmp: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Err(e) = std::fs::write(tmp, contents) {
        let _ = std::fs::remove_file(tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(tmp, target) {
        let _ = std::fs::remove_file(tmp);
        return Err(e);
    }
    Ok(())
}

fn prune_empty_parents(root: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the climb.
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        tracing::debug!("pruned empty directory {}", current.display());
        dir = current.parent();
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Unchanged,
    Delete,
}

impl Action {
    pub fn is_mutation(self) -> bool {
        !matches!(self, Action::Unchanged)
    }
}

/// Classification of a single path, before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub path: ManagedPath,
    pub action: Action,
    pub desired: Option<Fingerprint>,
    pub deployed: Option<Fingerprint>,
    pub size: u64,
}

/// Classify every path in either snapshot, sorted by path.
pub fn plan(desired: &Snapshot, deployed: &Snapshot) -> Vec<PlannedChange> {
    let union: BTreeSet<&ManagedPath> = desired.paths().chain(deployed.paths()).collect();

    union
        .into_iter()
        .map(|path| {
            let want = desired.get(path);
            let have = deployed.get(path);
            let action = match (want, have) {
                (Some(_), None) => Action::Create,
                (Some(w), Some(h)) if w.fingerprint == h.fingerprint => Action::Unchanged,
                (Some(_), Some(_)) => Action::Update,
                (None, Some(_)) => Action::Delete,
                (None, None) => unreachable!("path comes from one of the snapshots"),
            };
            PlannedChange {
                path: path.clone(),
                action,
                desired: want.map(|r| r.fingerprint),
                deployed: have.map(|r| r.fingerprint),
                size: want.or(have).map(|r| r.size).unwrap_or(0),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Action carried out (or nothing to do, for unchanged paths).
    Applied,
    /// Dry run: the action would have been carried out.
    Planned,
    Failed { error: String },
}

/// Result of one path in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathOutcome {
    pub path: ManagedPath,
    pub action: Action,
    pub size: u64,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub at: DateTime<Utc>,
}

impl PathOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<PathOutcome>,
    /// Entries left out of either snapshot; see [`crate::snapshot`].
    pub skipped: Vec<SkippedEntry>,
    pub dry_run: bool,
    /// Set when the pass stopped before visiting every path.
    pub cancelled: bool,
}

impl ReconcileReport {
    fn count(&self, action: Action) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.action == action && !o.is_failed())
            .count()
    }

    pub fn created(&self) -> usize {
        self.count(Action::Create)
    }

    pub fn updated(&self) -> usize {
        self.count(Action::Update)
    }

    pub fn unchanged(&self) -> usize {
        self.count(Action::Unchanged)
    }

    pub fn deleted(&self) -> usize {
        self.count(Action::Delete)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Successful creates, updates and deletes.
    pub fn mutations(&self) -> usize {
        self.created() + self.updated() + self.deleted()
    }

    pub fn has_errors(&self) -> bool {
        self.failed() > 0
    }

    pub fn outcome(&self, path: &str) -> Option<&PathOutcome> {
        self.outcomes.iter().find(|o| o.path.as_str() == path)
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub cancel: CancellationToken,
}

/// Plan and apply the changes that make `deployed` match `desired`.
///
/// Desired records without contents cannot be written; they are reported as
/// failed creates/updates rather than silently skipped.
pub fn reconcile(
    desired: &Snapshot,
    deployed: &Snapshot,
    fs: &dyn FilesystemPort,
    options: &ReconcileOptions,
) -> ReconcileReport {
    let mut report = ReconcileReport {
        dry_run: options.dry_run,
        ..ReconcileReport::default()
    };

    for change in plan(desired, deployed) {
        if options.cancel.is_cancelled() {
            tracing::warn!("reconciliation cancelled before {}", change.path);
            report.cancelled = true;
            break;
        }

        let status = if !change.action.is_mutation() {
            OutcomeStatus::Applied
        } else if options.dry_run {
            OutcomeStatus::Planned
        } else {
            match apply(&change, desired, fs) {
                Ok(()) => OutcomeStatus::Applied,
                Err(err) => OutcomeStatus::Failed {
                    error: err.to_string(),
                },
            }
        };

        report.outcomes.push(PathOutcome {
            path: change.path,
            action: change.action,
            size: change.size,
            status,
            at: Utc::now(),
        });
    }

    report
}

fn apply(change: &PlannedChange, desired: &Snapshot, fs: &dyn FilesystemPort) -> io::Result<()> {
    match change.action {
        Action::Create | Action::Update => {
            let contents = desired
                .get(&change.path)
                .and_then(|r| r.contents.as_deref())
                .ok_or_else(|| io::Error::other("desired record carries no contents"))?;
            fs.write(&change.path, contents)
        }
        Action::Delete => fs.remove(&change.path),
        Action::Unchanged => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifests_core::{fingerprint, ManifestRecord};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    fn managed(path: &str) -> ManagedPath {
        ManagedPath::parse(path).unwrap()
    }

    fn desired(files: &[(&str, &str)]) -> Snapshot {
        files
            .iter()
            .map(|(p, c)| ManifestRecord::from_contents(managed(p), c.as_bytes().to_vec()))
            .collect()
    }

    fn deployed(files: &[(&str, &str)]) -> Snapshot {
        files
            .iter()
            .map(|(p, c)| {
                ManifestRecord::without_contents(managed(p), c.len() as u64, fingerprint(c.as_bytes()))
            })
            .collect()
    }

    /// Records calls and fails for configured paths.
    #[derive(Default)]
    struct RecordingFs {
        writes: RefCell<Vec<String>>,
        removes: RefCell<Vec<String>>,
        fail_on: Vec<&'static str>,
    }

    impl FilesystemPort for RecordingFs {
        fn write(&self, path: &ManagedPath, _contents: &[u8]) -> io::Result<()> {
            if self.fail_on.iter().any(|p| *p == path.as_str()) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.writes.borrow_mut().push(path.to_string());
            Ok(())
        }

        fn remove(&self, path: &ManagedPath) -> io::Result<()> {
            if self.fail_on.iter().any(|p| *p == path.as_str()) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.removes.borrow_mut().push(path.to_string());
            Ok(())
        }
    }

    #[test]
    fn plan_classifies_the_union_of_paths() {
        let changes = plan(
            &desired(&[("a.yaml", "x"), ("b.json", "y"), ("d.yaml", "new")]),
            &deployed(&[("a.yaml", "x"), ("c.yml", "old"), ("d.yaml", "old")]),
        );
        let actions: Vec<_> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("a.yaml", Action::Unchanged),
                ("b.json", Action::Create),
                ("c.yml", Action::Delete),
                ("d.yaml", Action::Update),
            ]
        );
    }

    #[test]
    fn equal_size_different_contents_is_an_update() {
        let changes = plan(&desired(&[("a.yaml", "aaa")]), &deployed(&[("a.yaml", "bbb")]));
        assert_eq!(changes[0].action, Action::Update);
    }

    #[test]
    fn failures_are_isolated_per_path() {
        let fs = RecordingFs {
            fail_on: vec!["b.yaml", "old.yaml"],
            ..RecordingFs::default()
        };
        let report = reconcile(
            &desired(&[("a.yaml", "1"), ("b.yaml", "2"), ("c.yaml", "3")]),
            &deployed(&[("old.yaml", "x"), ("stale.yaml", "y")]),
            &fs,
            &ReconcileOptions::default(),
        );

        assert!(report.has_errors());
        assert_eq!(report.failed(), 2);
        assert_eq!(report.created(), 2);
        assert_eq!(report.deleted(), 1);
        assert_eq!(*fs.writes.borrow(), vec!["a.yaml", "c.yaml"]);
        assert_eq!(*fs.removes.borrow(), vec!["stale.yaml"]);
        assert!(matches!(
            report.outcome("b.yaml").unwrap().status,
            OutcomeStatus::Failed { .. }
        ));
    }

    #[test]
    fn dry_run_never_touches_the_port() {
        let fs = RecordingFs::default();
        let report = reconcile(
            &desired(&[("a.yaml", "1")]),
            &deployed(&[("b.yaml", "2")]),
            &fs,
            &ReconcileOptions {
                dry_run: true,
                ..ReconcileOptions::default()
            },
        );
        assert!(fs.writes.borrow().is_empty());
        assert!(fs.removes.borrow().is_empty());
        assert!(report.dry_run);
        assert!(!report.has_errors());
        assert_eq!(report.outcome("a.yaml").unwrap().status, OutcomeStatus::Planned);
        assert_eq!(report.outcome("b.yaml").unwrap().status, OutcomeStatus::Planned);
    }

    #[test]
    fn cancelled_reconcile_applies_nothing() {
        let fs = RecordingFs::default();
        let options = ReconcileOptions::default();
        options.cancel.cancel();
        let report = reconcile(&desired(&[("a.yaml", "1")]), &Snapshot::new(), &fs, &options);
        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
        assert!(fs.writes.borrow().is_empty());
    }

    #[test]
    fn record_without_contents_fails_instead_of_writing() {
        let fs = RecordingFs::default();
        let report = reconcile(
            &deployed(&[("a.yaml", "1")]),
            &Snapshot::new(),
            &fs,
            &ReconcileOptions::default(),
        );
        assert_eq!(report.failed(), 1);
        assert!(fs.writes.borrow().is_empty());
    }

    #[test]
    fn outcome_serializes_with_flat_status() {
        let fs = RecordingFs {
            fail_on: vec!["b.yaml"],
            ..RecordingFs::default()
        };
        let report = reconcile(
            &desired(&[("a.yaml", "1"), ("b.yaml", "2")]),
            &Snapshot::new(),
            &fs,
            &ReconcileOptions::default(),
        );

        let json = serde_json::to_value(&report).unwrap();
        let outcomes = json["outcomes"].as_array().unwrap();
        assert_eq!(outcomes[0]["path"], "a.yaml");
        assert_eq!(outcomes[0]["action"], "create");
        assert_eq!(outcomes[0]["status"], "applied");
        assert_eq!(outcomes[1]["status"], "failed");
        assert!(outcomes[1]["error"].as_str().unwrap().contains("read-only"));
    }

    #[test]
    fn local_fs_write_creates_parents_and_leaves_no_tmp() {
        let root = TempDir::new().unwrap();
        let local = LocalFs::new(root.path());
        let path = managed("apps/web/deploy.yaml");

        local.write(&path, b"kind: Deployment").unwrap();

        let target = path.to_local(root.path());
        assert_eq!(fs::read(&target).unwrap(), b"kind: Deployment");
        assert!(!tmp_path_for(&target).exists());
    }

    #[test]
    fn local_fs_write_replaces_existing_contents() {
        let root = TempDir::new().unwrap();
        let local = LocalFs::new(root.path());
        let path = managed("a.yaml");
        local.write(&path, b"old contents that are longer").unwrap();
        local.write(&path, b"new").unwrap();
        assert_eq!(fs::read(root.path().join("a.yaml")).unwrap(), b"new");
    }

    #[test]
    fn local_fs_remove_prunes_empty_parents_but_not_root() {
        let root = TempDir::new().unwrap();
        let local = LocalFs::new(root.path());
        local.write(&managed("apps/web/deploy.yaml"), b"x").unwrap();
        local.write(&managed("apps/keep.yaml"), b"y").unwrap();

        local.remove(&managed("apps/web/deploy.yaml")).unwrap();

        assert!(!root.path().join("apps").join("web").exists());
        assert!(root.path().join("apps").join("keep.yaml").exists());

        local.remove(&managed("apps/keep.yaml")).unwrap();
        assert!(!root.path().join("apps").exists());
        assert!(root.path().exists());
    }

    #[test]
    fn local_fs_remove_missing_file_errors() {
        let root = TempDir::new().unwrap();
        let err = LocalFs::new(root.path())
            .remove(&managed("absent.yaml"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();
        let target = readonly_dir.join("file.yaml");
        fs::write(&target, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp = tmp_dir.path().join("file.yaml.manifests.tmp");
        let result = atomic_write(&target, &tmp, b"new content");

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root ignores directory permissions; only assert when the rename was refused.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&target).unwrap(), "original");
            assert!(!tmp.exists(), "temporary file should be cleaned up");
        }
    }
}
