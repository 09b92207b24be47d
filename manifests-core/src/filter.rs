//! Path filter deciding which files the updater manages.
//!
//! A path is in scope iff it starts with none of the ignore prefixes and,
//! when any suffixes are configured, ends with at least one of them.
//!
//! Ignore prefixes are matched against the raw relative path string, not
//! per path segment: the prefix `metrics-server` also drops
//! `metrics-server-backup.yaml`. This mirrors how k3s bundles are laid out
//! and is kept as-is; add a trailing `/` to a prefix to restrict it to a
//! directory.

use std::collections::BTreeSet;

/// Manifests k3s deploys itself. Touching them would fight the server.
pub const K3S_IGNORE_PREFIXES: &[&str] = &[
    "ccm.yaml",
    "coredns.yaml",
    "local-storage.yaml",
    "metrics-server/",
    "rolebindings.yaml",
    "traefik.yaml",
    "metrics-server",
];

pub const K3S_ALLOWED_SUFFIXES: &[&str] = &[".yaml", ".yml", ".json"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub ignore_prefixes: BTreeSet<String>,
    pub allowed_suffixes: BTreeSet<String>,
}

impl FilterConfig {
    pub fn new<I, S, J, T>(ignore_prefixes: I, allowed_suffixes: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            ignore_prefixes: ignore_prefixes.into_iter().map(Into::into).collect(),
            allowed_suffixes: allowed_suffixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Manage every path.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Stock k3s server layout: skip bundled add-ons, keep YAML and JSON.
    pub fn k3s_defaults() -> Self {
        Self::new(
            K3S_IGNORE_PREFIXES.iter().copied(),
            K3S_ALLOWED_SUFFIXES.iter().copied(),
        )
    }

    pub fn in_scope(&self, path: &str) -> bool {
        in_scope(path, self)
    }
}

/// Whether `path` (relative, forward-slash separated) is managed under `config`.
pub fn in_scope(path: &str, config: &FilterConfig) -> bool {
    if config
        .ignore_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return false;
    }

    config.allowed_suffixes.is_empty()
        || config
            .allowed_suffixes
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
}
