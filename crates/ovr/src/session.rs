use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ovr_config::{
    OVR_DIR_NAME, OvrConfig, load_override_config_with_warnings, resolve_upstream_repo,
    resolve_upstream_version,
};
use ovr_core::{
    BoundUpstream, CrossProcessLock, GitUpstreamRepository, LockError, Manifest,
    OverrideDirRepository, bind_version,
};

use crate::cli::UpstreamArgs;

pub const CLI_LOCK_NAME: &str = "ovr-cli-lock";

/// One override directory plus its loaded config.
#[derive(Debug, Clone)]
pub struct OverrideWorkspace {
    root: PathBuf,
    config: OvrConfig,
}

impl OverrideWorkspace {
    pub fn open(dir: &Path) -> Result<Self> {
        let root = dir
            .canonicalize()
            .with_context(|| format!("override directory {} does not exist", dir.display()))?;
        if !root.is_dir() {
            anyhow::bail!("{} is not a directory", root.display());
        }

        let (config, warnings) = load_override_config_with_warnings(&root).with_context(|| {
            format!(
                "failed to load config at {}",
                ovr_config::config_path(&root).display()
            )
        })?;
        for warning in warnings {
            tracing::warn!(code = warning.code, field = warning.field, "{}", warning.message);
        }

        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &OvrConfig {
        &self.config
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.config.manifest.file_name)
    }

    pub fn override_repo(&self) -> OverrideDirRepository {
        OverrideDirRepository::new(&self.root)
            .with_excluded([OVR_DIR_NAME, self.config.manifest.file_name.as_str()])
            .with_excluded(&self.config.manifest.exclude)
    }

    pub fn upstream(&self, args: &UpstreamArgs) -> Result<BoundUpstream<GitUpstreamRepository>> {
        let version = resolve_upstream_version(&self.root, args.version.as_deref(), &self.config)?;
        let repo_path =
            resolve_upstream_repo(&self.root, args.upstream_repo.as_deref(), &self.config)?;
        tracing::info!(
            version = %version.version,
            source = version.source.as_str(),
            repo = %repo_path.display(),
            "using upstream"
        );

        let repo = GitUpstreamRepository::open(&repo_path)
            .with_context(|| format!("failed to open upstream repository {}", repo_path.display()))?
            .with_tag_prefix(self.config.upstream.tag_prefix.as_str());
        if !repo.has_version(&version.version) {
            anyhow::bail!(
                "upstream repository {} has no tag or revision for version {}",
                repo_path.display(),
                version.version
            );
        }

        Ok(bind_version(repo, version.version))
    }

    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        Manifest::read_from_file(&path)
            .with_context(|| format!("failed to read manifest {}", path.display()))
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path();
        manifest
            .write_to_file(&path)
            .with_context(|| format!("failed to write manifest {}", path.display()))
    }
}

/// Run `body` while holding the machine-wide CLI lock, so concurrent
/// invocations never interleave manifest writes.
pub fn with_cli_lock<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    let mut lock = CrossProcessLock::new(CLI_LOCK_NAME)?;
    if !lock.try_lock()? {
        tracing::info!("waiting for other instances of ovr to finish");
        lock.lock()?;
    }

    let outcome = body();
    finish_locked(outcome, lock.unlock())
}

// The command's own result wins over a failed release.
fn finish_locked<T>(outcome: Result<T>, released: Result<(), LockError>) -> Result<T> {
    if let Err(err) = released {
        tracing::warn!(lock = CLI_LOCK_NAME, error = %err, "failed to release lock");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn release_failure() -> LockError {
        LockError::Release {
            name: CLI_LOCK_NAME.to_owned(),
            source: io::Error::other("lock file vanished"),
        }
    }

    #[test]
    fn body_error_survives_release_failure() {
        let outcome: Result<()> = Err(anyhow::anyhow!("manifest write failed"));
        let err = finish_locked(outcome, Err(release_failure())).expect_err("body error");
        assert_eq!(err.to_string(), "manifest write failed");
    }

    #[test]
    fn body_value_survives_release_failure() {
        let code = finish_locked(Ok(1), Err(release_failure())).expect("exit code");
        assert_eq!(code, 1);
    }

    #[test]
    fn lock_is_released_after_a_failing_body() {
        let err = with_cli_lock(|| -> Result<()> { anyhow::bail!("boom") }).expect_err("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(with_cli_lock(|| Ok(())).is_ok());
    }
}
