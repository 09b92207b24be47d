//! Domain types shared by the snapshot builders and the reconciler.
//!
//! Paths inside a snapshot are always [`ManagedPath`]s: forward-slash
//! separated, relative to the managed root, never empty and never climbing
//! out of the root. Conversion to an on-disk `PathBuf` happens only at the
//! filesystem boundary via [`ManagedPath::to_local`].

use std::collections::hash_map::{self, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PathError;
use crate::fingerprint::{fingerprint, Fingerprint};

// ---------------------------------------------------------------------------
// ManagedPath
// ---------------------------------------------------------------------------

/// A normalised path relative to the managed root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ManagedPath(String);

impl ManagedPath {
    /// Normalise `raw` into a managed path.
    ///
    /// Leading separators and `.` segments are dropped and repeated
    /// separators collapse. A `..` segment anywhere is rejected rather than
    /// resolved. Backslashes are separators on Windows only; elsewhere they
    /// are ordinary file name characters.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let unified = if cfg!(windows) {
            raw.replace('\\', "/")
        } else {
            raw.to_string()
        };
        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(PathError::ParentSegment {
                        path: raw.to_string(),
                    })
                }
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location of this path under `root` on the local filesystem.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut local = root.to_path_buf();
        for segment in self.0.split('/') {
            local.push(segment);
        }
        local
    }
}

impl fmt::Display for ManagedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&str> for ManagedPath {
    type Error = PathError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl AsRef<str> for ManagedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ManifestRecord
// ---------------------------------------------------------------------------

/// One file in a snapshot.
///
/// `contents` is only populated for desired (remote) records; deployed
/// records are fingerprinted by streaming and never held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub path: ManagedPath,
    pub size: u64,
    pub fingerprint: Fingerprint,
    pub contents: Option<Vec<u8>>,
}

impl ManifestRecord {
    /// Record for bytes that will be written out, fingerprinted here.
    pub fn from_contents(path: ManagedPath, contents: Vec<u8>) -> Self {
        Self {
            path,
            size: contents.len() as u64,
            fingerprint: fingerprint(&contents),
            contents: Some(contents),
        }
    }

    /// Record for a file whose digest was computed elsewhere.
    pub fn without_contents(path: ManagedPath, size: u64, fingerprint: Fingerprint) -> Self {
        Self {
            path,
            size,
            fingerprint,
            contents: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Filtered file set keyed by managed path. Iteration order is unspecified;
/// use [`Snapshot::sorted_paths`] when a stable order matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: HashMap<ManagedPath, ManifestRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under its own path, returning any record it replaced.
    pub fn insert(&mut self, record: ManifestRecord) -> Option<ManifestRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn get(&self, path: &ManagedPath) -> Option<&ManifestRecord> {
        self.records.get(path)
    }

    pub fn remove(&mut self, path: &ManagedPath) -> Option<ManifestRecord> {
        self.records.remove(path)
    }

    pub fn contains(&self, path: &ManagedPath) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, ManagedPath, ManifestRecord> {
        self.records.values()
    }

    pub fn paths(&self) -> hash_map::Keys<'_, ManagedPath, ManifestRecord> {
        self.records.keys()
    }

    pub fn sorted_paths(&self) -> Vec<&ManagedPath> {
        let mut paths: Vec<_> = self.records.keys().collect();
        paths.sort();
        paths
    }
}

impl FromIterator<ManifestRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = ManifestRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_leading_separators_and_dots() {
        let path = ManagedPath::parse("/./apps//web/deploy.yaml").unwrap();
        assert_eq!(path.as_str(), "apps/web/deploy.yaml");
    }

    #[test]
    #[cfg(windows)]
    fn parse_converts_backslashes() {
        let path = ManagedPath::parse("apps\\web\\deploy.yaml").unwrap();
        assert_eq!(path.as_str(), "apps/web/deploy.yaml");
    }

    #[test]
    #[cfg(not(windows))]
    fn parse_keeps_backslashes_in_file_names() {
        let path = ManagedPath::parse("apps/a\\b.yaml").unwrap();
        assert_eq!(path.as_str(), "apps/a\\b.yaml");
        assert_eq!(
            path.to_local(Path::new("/root")),
            Path::new("/root").join("apps").join("a\\b.yaml")
        );
    }

    #[test]
    fn parse_rejects_parent_segments() {
        let err = ManagedPath::parse("apps/../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathError::ParentSegment { .. }));
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(ManagedPath::parse("").unwrap_err(), PathError::Empty);
        assert_eq!(ManagedPath::parse("/./").unwrap_err(), PathError::Empty);
    }

    #[test]
    fn to_local_joins_each_segment() {
        let path = ManagedPath::parse("apps/web/deploy.yaml").unwrap();
        let local = path.to_local(Path::new("/srv/manifests"));
        assert_eq!(
            local,
            Path::new("/srv/manifests").join("apps").join("web").join("deploy.yaml")
        );
    }

    #[test]
    fn record_from_contents_sets_size_and_digest() {
        let path = ManagedPath::parse("a.yaml").unwrap();
        let record = ManifestRecord::from_contents(path, b"x".to_vec());
        assert_eq!(record.size, 1);
        assert_eq!(record.fingerprint, fingerprint(b"x"));
        assert_eq!(record.contents.as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn snapshot_keys_are_unique() {
        let path = ManagedPath::parse("a.yaml").unwrap();
        let mut snapshot = Snapshot::new();
        assert!(snapshot
            .insert(ManifestRecord::from_contents(path.clone(), b"1".to_vec()))
            .is_none());
        let replaced = snapshot.insert(ManifestRecord::from_contents(path.clone(), b"2".to_vec()));
        assert!(replaced.is_some());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&path).unwrap().fingerprint, fingerprint(b"2"));
    }

    #[test]
    fn sorted_paths_is_lexicographic() {
        let snapshot: Snapshot = ["b.yaml", "a/z.yaml", "a.json"]
            .into_iter()
            .map(|p| ManifestRecord::from_contents(ManagedPath::parse(p).unwrap(), vec![]))
            .collect();
        let sorted: Vec<_> = snapshot.sorted_paths().into_iter().map(|p| p.as_str()).collect();
        assert_eq!(sorted, vec!["a.json", "a/z.yaml", "b.yaml"]);
    }
}
