//! # manifests-core
//!
//! Shared data model for the manifests updater: managed paths, content
//! fingerprints, snapshots, the path filter and process configuration.

pub mod config;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, PathError};
pub use filter::{in_scope, FilterConfig};
pub use fingerprint::{fingerprint, fingerprint_reader, Fingerprint};
pub use types::{ManagedPath, ManifestRecord, Snapshot};
