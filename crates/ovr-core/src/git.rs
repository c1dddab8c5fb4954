use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::repository::VersionedUpstreamRepository;
use crate::{RepoError, normalize_path};

pub const DEFAULT_TAG_PREFIX: &str = "v";

/// Upstream file contents read straight out of a git object database.
///
/// A version resolves to the tree of `<tag_prefix><version>` first and to the
/// bare `<version>` revision second. Resolved trees are cached so repeated
/// lookups at one version only pay for the blob read.
pub struct GitUpstreamRepository {
    repo: gix::ThreadSafeRepository,
    tag_prefix: String,
    trees: Mutex<HashMap<String, gix::ObjectId>>,
}

impl GitUpstreamRepository {
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let repo = gix::discover(path).map_err(|err| {
            RepoError::Git(format!(
                "failed to open upstream repository at {}: {err}",
                path.display()
            ))
        })?;

        Ok(Self {
            repo: repo.into_sync(),
            tag_prefix: DEFAULT_TAG_PREFIX.to_owned(),
            trees: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_tag_prefix(mut self, tag_prefix: impl Into<String>) -> Self {
        self.tag_prefix = tag_prefix.into();
        self
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag_prefix
    }

    /// Whether `version` names a tree in this repository.
    pub fn has_version(&self, version: &str) -> bool {
        let repo = self.repo.to_thread_local();
        self.resolve_tree(&repo, version).is_ok()
    }

    fn resolve_tree(
        &self,
        repo: &gix::Repository,
        version: &str,
    ) -> Result<gix::ObjectId, RepoError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(RepoError::UnknownVersion {
                version: version.to_owned(),
                reason: "version is empty".to_owned(),
            });
        }

        if let Some(tree_id) = self.cached_tree(version)? {
            return Ok(tree_id);
        }

        let mut candidates = vec![format!("{}{version}", self.tag_prefix)];
        if !self.tag_prefix.is_empty() {
            candidates.push(version.to_owned());
        }

        let mut last_error = String::new();
        for candidate in &candidates {
            match peel_revision_to_tree(repo, candidate) {
                Ok(tree_id) => {
                    tracing::debug!(version, revision = %candidate, tree = %tree_id, "resolved upstream version");
                    self.trees
                        .lock()
                        .map_err(|_| RepoError::Git("upstream tree cache poisoned".to_owned()))?
                        .insert(version.to_owned(), tree_id);
                    return Ok(tree_id);
                }
                Err(err) => last_error = err,
            }
        }

        Err(RepoError::UnknownVersion {
            version: version.to_owned(),
            reason: last_error,
        })
    }

    fn cached_tree(&self, version: &str) -> Result<Option<gix::ObjectId>, RepoError> {
        let trees = self
            .trees
            .lock()
            .map_err(|_| RepoError::Git("upstream tree cache poisoned".to_owned()))?;
        Ok(trees.get(version).copied())
    }
}

impl VersionedUpstreamRepository for GitUpstreamRepository {
    fn read_file_at(&self, path: &str, version: &str) -> Result<Option<String>, RepoError> {
        let repo = self.repo.to_thread_local();
        let tree_id = self.resolve_tree(&repo, version)?;

        let path = normalize_path(path);
        let relative = path.trim_start_matches("./");
        if relative.is_empty() || relative.split('/').any(|segment| segment == "..") {
            return Err(RepoError::InvalidPath(path));
        }

        let tree = repo
            .find_tree(tree_id)
            .map_err(|err| RepoError::Git(format!("failed to load tree {tree_id}: {err}")))?;
        let entry = tree
            .lookup_entry_by_path(relative)
            .map_err(|err| RepoError::Git(format!("failed to look up {relative}: {err}")))?;
        let Some(entry) = entry else {
            return Ok(None);
        };
        if !entry.mode().is_blob() {
            return Ok(None);
        }

        let blob = entry
            .object()
            .map_err(|err| RepoError::Git(format!("failed to read blob for {relative}: {err}")))?
            .detach();
        String::from_utf8(blob.data)
            .map(Some)
            .map_err(|_| RepoError::NotUtf8 {
                path: relative.to_owned(),
            })
    }
}

fn peel_revision_to_tree(repo: &gix::Repository, revision: &str) -> Result<gix::ObjectId, String> {
    let id = repo
        .rev_parse_single(revision)
        .map_err(|err| format!("failed to resolve {revision}: {err}"))?;
    let tree = id
        .object()
        .map_err(|err| format!("failed to load {revision}: {err}"))?
        .peel_to_tree()
        .map_err(|err| format!("{revision} does not point at a tree: {err}"))?;
    Ok(tree.id)
}
