// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tuf_repo::metadata::Role;
use tuf_repo::{RepoConfig, RepoLayout, Repository, Signed};

/// Config rooted at `root` with a cheap key derivation
pub fn test_config(root: &Path) -> RepoConfig {
    let mut config = RepoConfig::default();
    config.storage.root = root.to_path_buf();
    config.signing.kdf_log_n = 4;
    config
}

/// Bootstrap a repository in a fresh temp dir.
///
/// Returns (TempDir, Repository) - keep the TempDir alive to prevent cleanup.
pub fn setup_repo() -> (TempDir, Repository) {
    let temp_dir = tempfile::tempdir().unwrap();
    let repo = open_repo(temp_dir.path()).unwrap();
    (temp_dir, repo)
}

pub fn open_repo(root: &Path) -> tuf_repo::Result<Repository> {
    Repository::open(RepoLayout::new(root), test_config(root))
}

/// Read a stored metadata document from `<root>/metadata/<name>`
pub fn read_doc<T: Role>(root: &Path, name: &str) -> Signed<T> {
    Signed::from_file(&RepoLayout::new(root).metadata_dir().join(name)).unwrap()
}

/// Create a staging directory holding `files`, ready for `replace_targets`
pub fn stage_files(layout: &RepoLayout, files: &[(&str, &[u8])]) -> PathBuf {
    let staged = layout.new_staging_dir();
    fs::create_dir(&staged).unwrap();
    for (name, data) in files {
        fs::write(staged.join(name), data).unwrap();
    }
    staged
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

pub fn sha512_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha512};
    hex::encode(Sha512::digest(data))
}
