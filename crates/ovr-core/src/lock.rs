use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{LockError, blake3_hex};

const LOCK_DIR_NAME: &str = "ovr-locks";

/// Shared directory for named locks, visible to every process of the user.
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join(LOCK_DIR_NAME)
}

/// Named mutex shared between processes, backed by an OS file lock.
///
/// Locking is re-entrant for a single handle. Dropping the handle (or the
/// process dying) releases the lock.
#[derive(Debug)]
pub struct CrossProcessLock {
    name: String,
    path: PathBuf,
    held: Option<File>,
}

impl CrossProcessLock {
    pub fn new(name: &str) -> Result<Self, LockError> {
        Self::in_dir(name, &default_lock_dir())
    }

    pub fn in_dir(name: &str, dir: &Path) -> Result<Self, LockError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LockError::EmptyName);
        }

        Ok(Self {
            name: name.to_owned(),
            path: dir.join(lock_file_name(name)),
            held: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Take the lock if nobody else holds it. Returns `false` on contention.
    pub fn try_lock(&mut self) -> Result<bool, LockError> {
        if self.held.is_some() {
            return Ok(true);
        }

        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.held = Some(file);
                tracing::debug!(lock = %self.name, "acquired lock");
                Ok(true)
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(source) => Err(LockError::Acquire {
                name: self.name.clone(),
                source,
            }),
        }
    }

    /// Block until the lock is ours.
    pub fn lock(&mut self) -> Result<(), LockError> {
        if self.held.is_some() {
            return Ok(());
        }

        let file = self.open()?;
        file.lock_exclusive().map_err(|source| LockError::Acquire {
            name: self.name.clone(),
            source,
        })?;
        self.held = Some(file);
        tracing::debug!(lock = %self.name, "acquired lock");
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<(), LockError> {
        let Some(file) = self.held.take() else {
            return Ok(());
        };

        FileExt::unlock(&file).map_err(|source| LockError::Release {
            name: self.name.clone(),
            source,
        })?;
        tracing::debug!(lock = %self.name, "released lock");
        Ok(())
    }

    fn open(&self) -> Result<File, LockError> {
        let open_error = |source| LockError::Open {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(open_error)?;
        }

        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(open_error)
    }
}

impl Drop for CrossProcessLock {
    fn drop(&mut self) {
        if let Some(file) = self.held.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

// Readable prefix plus a digest of the full name, so distinct names never
// share a file even after sanitizing.
fn lock_file_name(name: &str) -> String {
    let readable = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(48)
        .collect::<String>();
    let digest = blake3_hex(name.as_bytes());
    format!("{readable}-{}.lock", &digest[..12])
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        let temp = tempdir().expect("tempdir");
        assert!(matches!(
            CrossProcessLock::in_dir("  ", temp.path()),
            Err(LockError::EmptyName)
        ));
    }

    #[test]
    fn second_handle_is_excluded_until_release() {
        let temp = tempdir().expect("tempdir");
        let mut first = CrossProcessLock::in_dir("ovr-cli-lock", temp.path()).expect("first");
        let mut second = CrossProcessLock::in_dir("ovr-cli-lock", temp.path()).expect("second");

        assert!(first.try_lock().expect("first try_lock"));
        assert!(!second.try_lock().expect("second try_lock"));
        assert!(!second.is_held());

        first.unlock().expect("unlock");
        assert!(!first.is_held());
        assert!(second.try_lock().expect("second try_lock after release"));
    }

    #[test]
    fn locking_is_reentrant_for_one_handle() {
        let temp = tempdir().expect("tempdir");
        let mut lock = CrossProcessLock::in_dir("reentrant", temp.path()).expect("lock");

        lock.lock().expect("lock");
        assert!(lock.try_lock().expect("try_lock while held"));
        lock.lock().expect("lock while held");
        assert!(lock.is_held());

        lock.unlock().expect("unlock");
        lock.unlock().expect("unlock is idempotent");
    }

    #[test]
    fn drop_releases_the_lock() {
        let temp = tempdir().expect("tempdir");
        {
            let mut held = CrossProcessLock::in_dir("dropped", temp.path()).expect("lock");
            held.lock().expect("lock");
        }

        let mut other = CrossProcessLock::in_dir("dropped", temp.path()).expect("lock");
        assert!(other.try_lock().expect("try_lock"));
    }

    #[test]
    fn different_names_do_not_contend() {
        let temp = tempdir().expect("tempdir");
        let mut a = CrossProcessLock::in_dir("tool a", temp.path()).expect("a");
        let mut b = CrossProcessLock::in_dir("tool/a", temp.path()).expect("b");

        assert_ne!(a.path(), b.path());
        assert!(a.try_lock().expect("a"));
        assert!(b.try_lock().expect("b"));
    }

    #[test]
    fn blocking_lock_waits_for_holder() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().to_path_buf();
        let mut holder = CrossProcessLock::in_dir("blocking", &dir).expect("holder");
        holder.lock().expect("holder lock");

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let mut waiter = CrossProcessLock::in_dir("blocking", &dir).expect("waiter");
            waiter.lock().expect("waiter lock");
            tx.send(()).expect("signal");
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        holder.unlock().expect("unlock");
        rx.recv_timeout(Duration::from_secs(10))
            .expect("waiter acquires after release");
        waiter.join().expect("join waiter");
    }
}
