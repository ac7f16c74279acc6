// src/repository/mod.rs

//! The trust repository
//!
//! [`Repository`] owns the signing key and the four role documents of one
//! repository directory. It provides:
//! - Bootstrap of a fresh repository and verified load of an existing one
//! - The cascading re-sign operations (see [`cascade`])
//! - Replacement of the target set
//! - Signing key rotation
//! - Atomic persistence of changed documents
//!
//! A `Repository` is not shared: one owner drives it (see
//! [`crate::service`]), so cascades never interleave.

mod cascade;
mod layout;
mod lock;
mod staging;
mod store;

pub use cascade::Change;
pub use layout::{RepoLayout, parse_root_version};
pub use lock::RepoLock;
pub use staging::{StagedTargets, validate_target_name};
pub use store::{RepoStatus, RoleStatus, RoleStore, RoleVersions};

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::filesystem::{restore_dir, swap_dir, write_atomic};
use crate::hash::digest_file;
use crate::metadata::{Root, Signed, Snapshot, TargetFile, Targets, Timestamp};
use crate::role::{RoleSet, RoleType};
use crate::signing::SigningKeyPair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

/// A signed TUF repository on local disk
#[derive(Debug)]
pub struct Repository {
    layout: RepoLayout,
    config: RepoConfig,
    store: RoleStore,
    signer: SigningKeyPair,
    _lock: RepoLock,
}

/// Result of writing out dirty documents
#[derive(Debug, Default)]
pub struct PersistReport {
    pub written: RoleSet,
    pub failed: Vec<(RoleType, Error)>,
}

impl PersistReport {
    /// Roles written, or the first write error
    pub fn into_result(self) -> Result<RoleSet> {
        match self.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(self.written),
        }
    }
}

/// Outcome of a target set replacement
#[derive(Debug, Clone, Serialize)]
pub struct TargetsReport {
    pub targets: Vec<String>,
    pub versions: RoleVersions,
}

/// Outcome of a signing key rotation
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub previous_key_id: String,
    pub key_id: String,
    pub versions: RoleVersions,
}

impl Repository {
    /// Open the repository at `layout`, bootstrapping it if no key exists
    pub fn open(layout: RepoLayout, config: RepoConfig) -> Result<Self> {
        Self::open_at(layout, config, Utc::now())
    }

    /// [`Repository::open`] with an explicit clock
    pub fn open_at(layout: RepoLayout, config: RepoConfig, now: DateTime<Utc>) -> Result<Self> {
        let lock = RepoLock::try_acquire(layout.lock_path())?;
        layout.recover_targets()?;
        layout.ensure_dirs()?;

        if layout.key_path().exists() {
            Self::load(layout, config, lock)
        } else {
            Self::bootstrap(layout, config, lock, now)
        }
    }

    /// Create a fresh repository
    ///
    /// The key file is written last: its presence is what marks a
    /// repository as bootstrapped, so a failure anywhere before that leaves
    /// a directory the next `open` bootstraps again.
    fn bootstrap(
        layout: RepoLayout,
        config: RepoConfig,
        lock: RepoLock,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        info!("Bootstrapping new repository at {:?}", layout.root());
        layout.clear_metadata()?;

        let signer = SigningKeyPair::generate()?;
        info!("Generated signing key {}", signer.key_id());

        let expiry = &config.expiry;
        let mut root = Root::new(expiry.expires_at(RoleType::Root, now));
        for role in RoleType::iter() {
            root.add_key(signer.public_key(), signer.key_id(), role);
        }
        let mut targets = Targets::new(expiry.expires_at(RoleType::Targets, now));
        targets.targets = scan_targets(&layout.targets_dir())?;
        let snapshot = Snapshot::new(expiry.expires_at(RoleType::Snapshot, now));
        let timestamp = Timestamp::new(expiry.expires_at(RoleType::Timestamp, now));

        let mut root = Signed::new(root);
        let mut targets = Signed::new(targets);
        let mut snapshot = Signed::new(snapshot);
        let mut timestamp = Signed::new(timestamp);
        root.sign(&signer)?;
        targets.sign(&signer)?;
        snapshot.sign(&signer)?;
        timestamp.sign(&signer)?;

        let mut store = RoleStore::new(root, targets, snapshot, timestamp);
        for role in RoleType::iter() {
            store.mark_dirty(role);
        }

        let mut repo = Self {
            layout,
            config,
            store,
            signer,
            _lock: lock,
        };
        repo.persist_dirty().into_result()?;
        repo.signer.save_encrypted(
            &repo.layout.key_path(),
            &repo.config.signing.passphrase,
            repo.config.signing.kdf_params(),
        )?;
        Ok(repo)
    }

    fn load(layout: RepoLayout, config: RepoConfig, lock: RepoLock) -> Result<Self> {
        let (version, root_path) = layout
            .latest_root()?
            .ok_or_else(|| Error::MissingRoot(layout.metadata_dir()))?;
        debug!("Loading root version {} from {:?}", version, root_path);

        let signer = SigningKeyPair::load_encrypted(&layout.key_path(), &config.signing.passphrase)?;

        let root = Signed::<Root>::from_file(&root_path)?;
        if root.signed.version != version {
            return Err(Error::MalformedMetadata {
                path: root_path,
                reason: format!("file name says version {}, content says {}", version, root.signed.version),
            });
        }
        root.verify(&root.signed)?;

        let metadata_dir = layout.metadata_dir();
        let targets =
            Signed::<Targets>::from_file(&metadata_dir.join(RoleType::Targets.meta_path()))?;
        let snapshot =
            Signed::<Snapshot>::from_file(&metadata_dir.join(RoleType::Snapshot.meta_path()))?;
        let timestamp =
            Signed::<Timestamp>::from_file(&metadata_dir.join(RoleType::Timestamp.meta_path()))?;
        targets.verify(&root.signed)?;
        snapshot.verify(&root.signed)?;
        timestamp.verify(&root.signed)?;

        for role in RoleType::iter() {
            if !root.signed.authorizes(role, signer.key_id()) {
                return Err(Error::UntrustedKey {
                    role,
                    key_id: signer.key_id().to_string(),
                });
            }
        }

        let store = RoleStore::new(root, targets, snapshot, timestamp);
        if !store.is_consistent() {
            warn!(
                "Loaded metadata is inconsistent: snapshot -> targets {:?} (current {}), timestamp -> snapshot {:?} (current {})",
                store.snapshot.signed.targets_version(),
                store.targets.signed.version,
                store.timestamp.signed.snapshot_version(),
                store.snapshot.signed.version
            );
        }

        let versions = store.versions();
        info!(
            "Loaded repository at {:?} (root v{}, targets v{}, snapshot v{}, timestamp v{})",
            layout.root(),
            versions.root,
            versions.targets,
            versions.snapshot,
            versions.timestamp
        );

        Ok(Self {
            layout,
            config,
            store,
            signer,
            _lock: lock,
        })
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn store(&self) -> &RoleStore {
        &self.store
    }

    /// The key currently signing every role
    pub fn signer(&self) -> &SigningKeyPair {
        &self.signer
    }

    pub fn status(&self, now: DateTime<Utc>) -> RepoStatus {
        self.store.status(now)
    }

    /// Write every dirty document
    ///
    /// A role's dirty flag is cleared only once its write succeeded; failed
    /// roles stay dirty and are retried on the next call.
    pub fn persist_dirty(&mut self) -> PersistReport {
        let mut report = PersistReport::default();
        for role in self.store.dirty().iter() {
            match self.write_role(role) {
                Ok(path) => {
                    self.store.clear_dirty(role);
                    report.written.insert(role);
                    debug!("Wrote {} metadata to {:?}", role, path);
                }
                Err(e) => {
                    error!("Failed to persist {} metadata: {}", role, e);
                    report.failed.push((role, e));
                }
            }
        }
        report
    }

    fn write_role(&self, role: RoleType) -> Result<PathBuf> {
        let bytes = match role {
            RoleType::Root => self.store.root.to_bytes()?,
            RoleType::Targets => self.store.targets.to_bytes()?,
            RoleType::Snapshot => self.store.snapshot.to_bytes()?,
            RoleType::Timestamp => self.store.timestamp.to_bytes()?,
        };
        let path = self.layout.document_path(role, self.store.version(role));
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Swap `staged` in as the target set, rebind targets and publish
    ///
    /// If the rebind fails the previous target set is put back and the new
    /// one returned to `staged`. Once the rebind succeeded the new state
    /// stands even if persisting it fails; the error is still returned and
    /// the documents stay dirty. On success `staged` no longer exists.
    pub fn replace_targets(&mut self, staged: &Path, now: DateTime<Utc>) -> Result<TargetsReport> {
        let live = self.layout.targets_dir();
        let had_previous = swap_dir(staged, &live)?;

        if let Err(e) = self.cascade(Change::Targets { rebind: true }, now) {
            warn!("Target rebind failed, restoring previous target set: {}", e);
            if let Err(restore_err) = restore_dir(&live, staged, had_previous) {
                error!("Failed to restore previous target set: {}", restore_err);
            }
            return Err(e);
        }

        // `staged` now holds the previous set
        if had_previous && let Err(e) = fs::remove_dir_all(staged) {
            warn!("Failed to remove previous target set {:?}: {}", staged, e);
        }

        self.persist_dirty().into_result()?;
        Ok(TargetsReport {
            targets: self.store.targets.signed.targets.keys().cloned().collect(),
            versions: self.store.versions(),
        })
    }

    /// Replace the signing key
    ///
    /// The new key is written to the key file before any document changes,
    /// so a failed key write leaves the repository untouched.
    pub fn rotate_key(&mut self, now: DateTime<Utc>) -> Result<RotationReport> {
        let new_key = SigningKeyPair::generate()?;
        new_key.save_encrypted(
            &self.layout.key_path(),
            &self.config.signing.passphrase,
            self.config.signing.kdf_params(),
        )?;
        info!("Persisted new signing key {}", new_key.key_id());

        let previous_key_id = self.signer.key_id().to_string();
        self.cascade(
            Change::Root {
                new_key: Some(new_key),
            },
            now,
        )?;
        self.persist_dirty().into_result()?;

        Ok(RotationReport {
            previous_key_id,
            key_id: self.signer.key_id().to_string(),
            versions: self.store.versions(),
        })
    }
}

/// Describe every file in the flat target directory
///
/// Subdirectories are skipped; target names must be valid UTF-8.
pub fn scan_targets(dir: &Path) -> Result<BTreeMap<String, TargetFile>> {
    let mut targets = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            debug!("Skipping non-file {:?} in target directory", path);
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| Error::InvalidTargetName(name.to_string_lossy().into_owned()))?;
        let digest = digest_file(&path)?;
        targets.insert(name, TargetFile::from(digest));
    }
    Ok(targets)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Config with a cheap key derivation, rooted at `root`
    pub fn test_config(root: &Path) -> RepoConfig {
        let mut config = RepoConfig::default();
        config.storage.root = root.to_path_buf();
        config.signing.kdf_log_n = 4;
        config
    }

    pub fn open_test_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::open(RepoLayout::new(dir.path()), test_config(dir.path())).unwrap();
        (dir, repo)
    }
}
