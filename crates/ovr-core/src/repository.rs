//! Read access to override files and to the upstream tree they derive from.
//!
//! "Not present" is a value, not an error: upstream lookups return
//! `Ok(None)` for paths that never existed at a version, and every `Err` is a
//! genuine access failure.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{RepoError, normalize_path};

pub trait OverrideRepository: Send + Sync {
    /// Every regular file under the repository, as sorted `/`-separated
    /// relative paths.
    fn list_files(&self) -> Result<Vec<String>, RepoError>;

    /// Text of an override file. Missing files are `RepoError::NotFound`.
    fn read_file(&self, path: &str) -> Result<String, RepoError>;

    fn file_exists(&self, path: &str) -> Result<bool, RepoError>;
}

pub trait VersionedUpstreamRepository: Send + Sync {
    fn read_file_at(&self, path: &str, version: &str) -> Result<Option<String>, RepoError>;
}

impl<R: VersionedUpstreamRepository + ?Sized> VersionedUpstreamRepository for &R {
    fn read_file_at(&self, path: &str, version: &str) -> Result<Option<String>, RepoError> {
        (**self).read_file_at(path, version)
    }
}

/// Upstream pinned to a single version for the lifetime of the handle.
pub trait UpstreamRepository: Send + Sync {
    fn version(&self) -> &str;

    fn read_file(&self, path: &str) -> Result<Option<String>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct BoundUpstream<R> {
    repo: R,
    version: String,
}

pub fn bind_version<R: VersionedUpstreamRepository>(
    repo: R,
    version: impl Into<String>,
) -> BoundUpstream<R> {
    BoundUpstream {
        repo,
        version: version.into(),
    }
}

impl<R> BoundUpstream<R> {
    pub fn inner(&self) -> &R {
        &self.repo
    }
}

impl<R: VersionedUpstreamRepository> UpstreamRepository for BoundUpstream<R> {
    fn version(&self) -> &str {
        &self.version
    }

    fn read_file(&self, path: &str) -> Result<Option<String>, RepoError> {
        self.repo.read_file_at(&normalize_path(path), &self.version)
    }
}

#[derive(Debug, Clone)]
pub struct OverrideDirRepository {
    root: PathBuf,
    excluded: Vec<String>,
}

impl OverrideDirRepository {
    /// The manifest itself is never treated as an override.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: vec![MANIFEST_FILE_NAME.to_owned()],
        }
    }

    /// Skip additional relative files or whole directories when listing.
    pub fn with_excluded<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let normalized = normalize_path(path.as_ref().trim())
                .trim_matches('/')
                .to_owned();
            if !normalized.is_empty() && !self.excluded.contains(&normalized) {
                self.excluded.push(normalized);
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, relative: &str) -> bool {
        self.excluded.iter().any(|excluded| {
            relative == excluded
                || relative
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, RepoError> {
        let normalized = normalize_path(path);
        let relative = Path::new(&normalized);
        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if normalized.is_empty() || escapes {
            return Err(RepoError::InvalidPath(path.to_owned()));
        }

        Ok(self.root.join(relative))
    }
}

impl OverrideRepository for OverrideDirRepository {
    fn list_files(&self) -> Result<Vec<String>, RepoError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                RepoError::io(path, err.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = normalize_path(&relative.to_string_lossy());
            if self.is_excluded(&relative) {
                continue;
            }
            files.push(relative);
        }

        files.sort();
        Ok(files)
    }

    fn read_file(&self, path: &str) -> Result<String, RepoError> {
        let full_path = self.resolve(path)?;
        let bytes = match fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RepoError::NotFound(normalize_path(path)));
            }
            Err(err) => return Err(RepoError::io(full_path, err)),
        };

        String::from_utf8(bytes).map_err(|_| RepoError::NotUtf8 {
            path: normalize_path(path),
        })
    }

    fn file_exists(&self, path: &str) -> Result<bool, RepoError> {
        Ok(self.resolve(path)?.is_file())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOverrideRepository {
    files: BTreeMap<String, String>,
}

impl InMemoryOverrideRepository {
    pub fn new<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, content)| (normalize_path(path.as_ref()), content.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, path: &str, content: impl Into<String>) {
        self.files.insert(normalize_path(path), content.into());
    }
}

impl OverrideRepository for InMemoryOverrideRepository {
    fn list_files(&self) -> Result<Vec<String>, RepoError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read_file(&self, path: &str) -> Result<String, RepoError> {
        let path = normalize_path(path);
        self.files
            .get(&path)
            .cloned()
            .ok_or(RepoError::NotFound(path))
    }

    fn file_exists(&self, path: &str) -> Result<bool, RepoError> {
        Ok(self.files.contains_key(&normalize_path(path)))
    }
}

/// Upstream snapshots keyed by version, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUpstreamRepository {
    versions: BTreeMap<String, BTreeMap<String, String>>,
}

impl InMemoryUpstreamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version<I, P, C>(mut self, version: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let snapshot = self.versions.entry(version.to_owned()).or_default();
        for (path, content) in files {
            snapshot.insert(normalize_path(path.as_ref()), content.into());
        }
        self
    }

    pub fn insert(&mut self, version: &str, path: &str, content: impl Into<String>) {
        self.versions
            .entry(version.to_owned())
            .or_default()
            .insert(normalize_path(path), content.into());
    }

    pub fn remove(&mut self, version: &str, path: &str) -> Option<String> {
        self.versions
            .get_mut(version)
            .and_then(|snapshot| snapshot.remove(&normalize_path(path)))
    }
}

impl VersionedUpstreamRepository for InMemoryUpstreamRepository {
    fn read_file_at(&self, path: &str, version: &str) -> Result<Option<String>, RepoError> {
        let snapshot = self
            .versions
            .get(version)
            .ok_or_else(|| RepoError::UnknownVersion {
                version: version.to_owned(),
                reason: "no snapshot recorded".to_owned(),
            })?;
        Ok(snapshot.get(&normalize_path(path)).cloned())
    }
}
