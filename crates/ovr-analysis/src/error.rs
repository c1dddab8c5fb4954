use ovr_core::{ManifestError, RepoError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("failed to read override '{file}': {source}")]
    OverrideRead {
        file: String,
        #[source]
        source: RepoError,
    },
    #[error("override file '{0}' does not exist")]
    OverrideFileMissing(String),
    #[error("override '{0}' is not part of the manifest")]
    OverrideNotFound(String),
    #[error("base file '{base_file}' of '{file}' does not exist at version {version}")]
    BaseNotFound {
        file: String,
        base_file: String,
        version: String,
    },
    #[error("invalid entry for '{file}': {reason}")]
    InvalidEntry { file: String, reason: String },
    #[error("'{0}' has no upstream base to refresh")]
    Unclassified(String),
    #[error("{0}")]
    Message(String),
}
