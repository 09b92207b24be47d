use thiserror::Error;

/// Rejections raised while normalising a relative manifest path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("managed path is empty")]
    Empty,

    #[error("managed path '{path}' escapes the managed root")]
    ParentSegment { path: String },
}

/// Startup configuration errors. Any of these prevents the process from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PORT value {value:?} is invalid: {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("GIT_REPO_URL cannot be empty")]
    MissingRepoUrl,

    #[error("SYNC_TIMEOUT_SECS value {value:?} is invalid: {reason}")]
    InvalidTimeout { value: String, reason: String },
}
