// src/repository/staging.rs

//! Staging area for an uploaded target set
//!
//! An upload is written into a fresh directory next to `targets/`. Once
//! complete, the [`StagedTargets`] is handed to the repository service with
//! the replace request. The directory is removed when the [`StagedTargets`]
//! is dropped, which covers both aborted uploads and the leftovers of a
//! failed swap.

use super::RepoLayout;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reject names that are not a single plain path component
pub fn validate_target_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidTargetName(name.to_string()));
    }
    Ok(())
}

/// A target set being received
#[derive(Debug)]
pub struct StagedTargets {
    dir: PathBuf,
    names: BTreeSet<String>,
    bytes: u64,
}

impl StagedTargets {
    /// Create an empty staging directory for `layout`
    pub async fn create(layout: &RepoLayout) -> Result<Self> {
        let dir = layout.new_staging_dir();
        fs::create_dir(&dir).await?;
        debug!("Staging upload in {:?}", dir);
        Ok(Self {
            dir,
            names: BTreeSet::new(),
            bytes: 0,
        })
    }

    /// Open a new file for target `name`
    ///
    /// Fails on invalid names and on a name already staged.
    pub async fn create_file(&mut self, name: &str) -> Result<File> {
        validate_target_name(name)?;
        if self.names.contains(name) {
            return Err(Error::DuplicateTarget(name.to_string()));
        }
        let file = File::create(self.dir.join(name)).await?;
        self.names.insert(name.to_string());
        Ok(file)
    }

    /// Stage target `name` with the given content
    pub async fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut file = self.create_file(name).await?;
        file.write_all(data).await?;
        file.flush().await?;
        self.record_bytes(data.len() as u64);
        Ok(())
    }

    /// Account for bytes written through a file from [`StagedTargets::create_file`]
    pub fn record_bytes(&mut self, len: u64) {
        self.bytes += len;
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Staged target names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for StagedTargets {
    fn drop(&mut self) {
        // Already gone after a successful swap
        if self.dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.dir)
        {
            warn!("Failed to remove staging directory {:?}: {}", self.dir, e);
        }
    }
}
