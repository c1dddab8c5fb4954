use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("git error: {0}")]
    Git(String),
    #[error("unknown upstream version '{version}': {reason}")]
    UnknownVersion { version: String, reason: String },
    #[error("{path} is not valid UTF-8 text")]
    NotUtf8 { path: String },
    #[error("invalid repository path '{0}'")]
    InvalidPath(String),
}

impl RepoError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort a whole generator run. The rest only mean a single
    /// file cannot be classified.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Git(_) | Self::UnknownVersion { .. } => true,
            Self::NotFound(_) | Self::NotUtf8 { .. } | Self::InvalidPath(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("override '{0}' is listed more than once")]
    DuplicateOverride(String),
    #[error("invalid entry for '{file}': {reason}")]
    InvalidEntry { file: String, reason: String },
    #[error("override '{0}' is not part of the manifest")]
    OverrideNotFound(String),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock name must not be empty")]
    EmptyName,
    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire lock {name}: {source}")]
    Acquire {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to release lock {name}: {source}")]
    Release {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
