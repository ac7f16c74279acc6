// src/repository/lock.rs

//! Exclusive ownership lock for a repository directory
//!
//! The serving process holds this lock for its entire lifetime so that only
//! one process ever re-signs a given repository. Two owners would race on
//! version increments and overwrite each other's metadata.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive repository lock
///
/// Held with `flock(LOCK_EX)`; released when dropped.
#[derive(Debug)]
pub struct RepoLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the lock without blocking
    ///
    /// Fails with [`Error::LockHeld`] if another owner holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired repository lock at {:?}", path);
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Repository lock already held at {:?}", path);
                Err(Error::LockHeld(path))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        debug!("Released repository lock at {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".lock");

        let lock = RepoLock::try_acquire(&lock_path).unwrap();
        assert!(lock.path().exists());

        drop(lock);
        let again = RepoLock::try_acquire(&lock_path);
        assert!(again.is_ok());
    }

    #[test]
    fn test_second_owner_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(".lock");

        let _first = RepoLock::try_acquire(&lock_path).unwrap();
        let second = RepoLock::try_acquire(&lock_path);
        assert!(matches!(second, Err(Error::LockHeld(_))));
    }
}
