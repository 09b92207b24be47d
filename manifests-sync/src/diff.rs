//! Dry-run unified diff support for `manifests-updater diff`.

use std::io::ErrorKind;
use std::path::Path;

use manifests_core::FilterConfig;
use similar::TextDiff;
use tokio_util::sync::CancellationToken;

use crate::error::{io_err, SyncError};
use crate::pipeline::protect_unreadable;
use crate::reconcile::{plan, Action};
use crate::remote::RemoteSource;
use crate::snapshot::{build_deployed, build_desired};

/// A single pending file change rendered as a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub action: Action,
    pub unified_diff: String,
}

/// Compare the remote head with the managed root without writing anything.
///
/// Only creates, updates and deletes produce a diff. Non-UTF-8 contents are
/// rendered lossily.
pub fn diff_changes(
    source: &dyn RemoteSource,
    root: &Path,
    filter: &FilterConfig,
) -> Result<Vec<FileDiff>, SyncError> {
    let cancel = CancellationToken::new();
    let desired = build_desired(source, filter, &cancel)?;
    let mut deployed = build_deployed(root, filter, &cancel)?;
    protect_unreadable(&desired, &mut deployed);

    let mut diffs = Vec::new();
    for change in plan(&desired.snapshot, &deployed.snapshot) {
        if !change.action.is_mutation() {
            continue;
        }

        let new = desired
            .snapshot
            .get(&change.path)
            .and_then(|r| r.contents.as_deref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        let old = match change.action {
            Action::Create => String::new(),
            _ => read_existing_or_empty(&change.path.to_local(root))?,
        };

        let (old_header, new_header) = match change.action {
            Action::Create => ("/dev/null".to_string(), format!("b/{}", change.path)),
            Action::Delete => (format!("a/{}", change.path), "/dev/null".to_string()),
            _ => (format!("a/{}", change.path), format!("b/{}", change.path)),
        };

        let unified_diff = TextDiff::from_lines(&old, &new)
            .unified_diff()
            .context_radius(3)
            .header(&old_header, &new_header)
            .to_string();

        diffs.push(FileDiff {
            path: change.path.to_string(),
            action: change.action,
            unified_diff,
        });
    }

    Ok(diffs)
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(io_err(path, e)),
    }
}
