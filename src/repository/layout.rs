// src/repository/layout.rs

//! On-disk layout of a repository
//!
//! ```text
//! <root>/
//!   key                   encrypted signing key
//!   .lock                 ownership lock
//!   targets/              staged target files (flat)
//!   metadata/
//!     1.root.json         every root version, never overwritten
//!     2.root.json
//!     targets.json        single live copy
//!     snapshot.json
//!     timestamp.json
//! ```

use crate::error::Result;
use crate::filesystem::temp_sibling;
use crate::role::RoleType;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ROOT_SUFFIX: &str = ".root.json";
const TARGETS_DIR: &str = "targets";

/// Paths of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn targets_dir(&self) -> PathBuf {
        self.root.join(TARGETS_DIR)
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join("key")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Create the repository, metadata and targets directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.metadata_dir(), self.targets_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                debug!("Created directory {:?}", dir);
            }
        }
        Ok(())
    }

    /// Clean up after an interrupted target set swap or upload
    ///
    /// A target set moved aside by a swap that never finished is put back
    /// when `targets/` is missing. Every other leftover sibling of
    /// `targets/` is removed. Must only run while holding the repository
    /// lock.
    pub fn recover_targets(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }

        let aside_prefix = format!(".{}.old-", TARGETS_DIR);
        let staging_prefix = format!(".{}.staging-", TARGETS_DIR);
        let mut aside = Vec::new();
        let mut stale = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with(&aside_prefix) {
                aside.push(entry.path());
            } else if name.starts_with(&staging_prefix) {
                stale.push(entry.path());
            }
        }

        let targets = self.targets_dir();
        if !targets.exists()
            && let Some(previous) = aside.pop()
        {
            warn!("Restoring target set {:?} left by an interrupted swap", previous);
            fs::rename(&previous, &targets)?;
        }

        for dir in aside.into_iter().chain(stale) {
            debug!("Removing stale directory {:?}", dir);
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Path of a role document at `version`
    ///
    /// Only root paths depend on the version; the other roles have a
    /// single live file.
    pub fn document_path(&self, role: RoleType, version: u64) -> PathBuf {
        match role {
            RoleType::Root => self.root_path(version),
            RoleType::Targets | RoleType::Snapshot | RoleType::Timestamp => {
                self.metadata_dir().join(role.meta_path())
            }
        }
    }

    pub fn root_path(&self, version: u64) -> PathBuf {
        self.metadata_dir().join(format!("{}{}", version, ROOT_SUFFIX))
    }

    /// All stored root versions, ascending
    pub fn root_versions(&self) -> Result<Vec<u64>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(self.metadata_dir())? {
            let entry = entry?;
            if let Some(version) = entry.file_name().to_str().and_then(parse_root_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// The highest stored root version, compared numerically
    pub fn latest_root(&self) -> Result<Option<(u64, PathBuf)>> {
        Ok(self
            .root_versions()?
            .last()
            .map(|&version| (version, self.root_path(version))))
    }

    /// Remove every metadata document (used when bootstrapping a new identity)
    pub fn clear_metadata(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(self.metadata_dir())? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} stale metadata file(s)", removed);
        }
        Ok(removed)
    }

    /// A fresh directory path next to `targets/` for staging an upload
    ///
    /// Staging lives on the same filesystem so the swap is a rename.
    pub fn new_staging_dir(&self) -> PathBuf {
        temp_sibling(&self.targets_dir(), "staging")
    }
}

/// Parse the version out of `{N}.root.json`
pub fn parse_root_version(file_name: &str) -> Option<u64> {
    let prefix = file_name.strip_suffix(ROOT_SUFFIX)?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok().filter(|&version| version > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_root_version() {
        assert_eq!(parse_root_version("1.root.json"), Some(1));
        assert_eq!(parse_root_version("10.root.json"), Some(10));
        assert_eq!(parse_root_version("root.json"), None);
        assert_eq!(parse_root_version("x.root.json"), None);
        assert_eq!(parse_root_version("0.root.json"), None);
        assert_eq!(parse_root_version("-3.root.json"), None);
        assert_eq!(parse_root_version("3.root.json.tmp"), None);
        assert_eq!(parse_root_version("timestamp.json"), None);
    }

    #[test]
    fn test_latest_root_is_numeric() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepoLayout::new(temp_dir.path());
        layout.ensure_dirs().unwrap();

        for name in ["2.root.json", "9.root.json", "10.root.json", "targets.json"] {
            fs::write(layout.metadata_dir().join(name), b"{}").unwrap();
        }

        let (version, path) = layout.latest_root().unwrap().unwrap();
        assert_eq!(version, 10);
        assert_eq!(path, layout.metadata_dir().join("10.root.json"));
        assert_eq!(layout.root_versions().unwrap(), vec![2, 9, 10]);
    }

    #[test]
    fn test_latest_root_empty() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepoLayout::new(temp_dir.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.latest_root().unwrap().is_none());
    }

    #[test]
    fn test_document_paths() {
        let layout = RepoLayout::new("/srv/repo");
        assert_eq!(
            layout.document_path(RoleType::Root, 4),
            PathBuf::from("/srv/repo/metadata/4.root.json")
        );
        assert_eq!(
            layout.document_path(RoleType::Snapshot, 4),
            PathBuf::from("/srv/repo/metadata/snapshot.json")
        );
        assert_eq!(layout.key_path(), PathBuf::from("/srv/repo/key"));
    }

    #[test]
    fn test_clear_metadata_only_removes_json() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepoLayout::new(temp_dir.path());
        layout.ensure_dirs().unwrap();
        fs::write(layout.metadata_dir().join("1.root.json"), b"{}").unwrap();
        fs::write(layout.metadata_dir().join("notes.txt"), b"keep").unwrap();

        assert_eq!(layout.clear_metadata().unwrap(), 1);
        assert!(layout.metadata_dir().join("notes.txt").exists());
    }

    #[test]
    fn test_recover_targets_restores_set_moved_aside() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepoLayout::new(temp_dir.path());
        let aside = temp_dir.path().join(".targets.old-0123");
        fs::create_dir_all(&aside).unwrap();
        fs::write(aside.join("fw.img"), b"firmware").unwrap();
        let staging = layout.new_staging_dir();
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("partial.bin"), b"part").unwrap();

        layout.recover_targets().unwrap();

        assert_eq!(fs::read(layout.targets_dir().join("fw.img")).unwrap(), b"firmware");
        assert!(!aside.exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_recover_targets_keeps_live_set() {
        let temp_dir = TempDir::new().unwrap();
        let layout = RepoLayout::new(temp_dir.path());
        layout.ensure_dirs().unwrap();
        fs::write(layout.targets_dir().join("new.bin"), b"new").unwrap();
        let aside = temp_dir.path().join(".targets.old-4567");
        fs::create_dir_all(&aside).unwrap();
        fs::write(aside.join("old.bin"), b"old").unwrap();

        layout.recover_targets().unwrap();

        assert!(layout.targets_dir().join("new.bin").exists());
        assert!(!layout.targets_dir().join("old.bin").exists());
        assert!(!aside.exists());
    }

    #[test]
    fn test_staging_dir_is_sibling_of_targets() {
        let layout = RepoLayout::new("/srv/repo");
        let staging = layout.new_staging_dir();
        assert_eq!(staging.parent(), Some(Path::new("/srv/repo")));
        assert_ne!(staging, layout.new_staging_dir());
    }
}
