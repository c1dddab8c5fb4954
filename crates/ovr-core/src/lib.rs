mod error;
mod git;
mod lock;
mod manifest;
mod repository;
mod similarity;

use sha2::{Digest, Sha256};

pub use error::{LockError, ManifestError, RepoError};
pub use git::{DEFAULT_TAG_PREFIX, GitUpstreamRepository};
pub use lock::{CrossProcessLock, default_lock_dir};
pub use manifest::{
    Issue, MANIFEST_FILE_NAME, Manifest, OverrideEntry, OverrideType, UNKNOWN_SENTINEL,
};
pub use repository::{
    BoundUpstream, InMemoryOverrideRepository, InMemoryUpstreamRepository, OverrideDirRepository,
    OverrideRepository, UpstreamRepository, VersionedUpstreamRepository, bind_version,
};
pub use similarity::{
    DEFAULT_SIMILARITY_THRESHOLD, Similarity, compute_similarity, compute_similarity_with_threshold,
    edit_distance, is_exact_copy, strip_license_header,
};

/// Drop every whitespace character. Two blobs equal under this are treated as
/// exact copies.
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// Hex SHA-256 of the raw content. Stored as `baseHash` in manifests, so it
/// must stay stable across runs and platforms.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
