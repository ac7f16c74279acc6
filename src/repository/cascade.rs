// src/repository/cascade.rs

//! Cascading re-sign pipeline
//!
//! A change to one role invalidates every role that points at it, so each
//! re-sign continues downstream: targets → snapshot → timestamp. Root only
//! continues when it rotates the signing key, since the new key must then
//! re-sign every other role.

use super::{Repository, scan_targets};
use crate::error::Result;
use crate::metadata::{Role, TargetFile};
use crate::role::{RoleSet, RoleType};
use crate::signing::SigningKeyPair;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::info;

/// The role change that starts a cascade
#[derive(Debug)]
pub enum Change {
    /// Re-sign root, optionally rotating to `new_key`
    Root { new_key: Option<SigningKeyPair> },
    /// Re-sign targets; with `rebind` the target set is rescanned first
    Targets { rebind: bool },
    Snapshot,
    Timestamp,
}

/// Pipeline stage below root
enum Step {
    Targets(Option<BTreeMap<String, TargetFile>>),
    Snapshot,
    Timestamp,
}

impl Repository {
    /// Apply `change` and every re-sign it implies, in trust order
    ///
    /// Returns the roles that were re-signed. Documents are only marked
    /// dirty here; writing them out is left to the caller.
    pub fn cascade(&mut self, change: Change, now: DateTime<Utc>) -> Result<RoleSet> {
        let mut touched = RoleSet::empty();

        let mut next = match change {
            Change::Root { new_key } => {
                let rotating = new_key.is_some();
                self.renew_root(new_key, now)?;
                touched.insert(RoleType::Root);
                rotating.then_some(Step::Targets(None))
            }
            Change::Targets { rebind } => {
                // Scan before touching anything so a bad target set changes nothing
                let mapping = if rebind {
                    Some(scan_targets(&self.layout.targets_dir())?)
                } else {
                    None
                };
                Some(Step::Targets(mapping))
            }
            Change::Snapshot => Some(Step::Snapshot),
            Change::Timestamp => Some(Step::Timestamp),
        };

        while let Some(step) = next.take() {
            next = match step {
                Step::Targets(mapping) => {
                    self.renew_targets(mapping, now)?;
                    touched.insert(RoleType::Targets);
                    Some(Step::Snapshot)
                }
                Step::Snapshot => {
                    self.renew_snapshot(now)?;
                    touched.insert(RoleType::Snapshot);
                    Some(Step::Timestamp)
                }
                Step::Timestamp => {
                    self.renew_timestamp(now)?;
                    touched.insert(RoleType::Timestamp);
                    None
                }
            };
        }

        Ok(touched)
    }

    /// Re-sign root; with `new_key` the signing key is rotated
    ///
    /// A rotating root carries signatures from both the outgoing and the
    /// incoming key, and the cascade continues through every other role.
    pub fn resign_root(
        &mut self,
        new_key: Option<SigningKeyPair>,
        now: DateTime<Utc>,
    ) -> Result<RoleSet> {
        self.cascade(Change::Root { new_key }, now)
    }

    pub fn resign_targets(&mut self, rebind: bool, now: DateTime<Utc>) -> Result<RoleSet> {
        self.cascade(Change::Targets { rebind }, now)
    }

    pub fn resign_snapshot(&mut self, now: DateTime<Utc>) -> Result<RoleSet> {
        self.cascade(Change::Snapshot, now)
    }

    pub fn resign_timestamp(&mut self, now: DateTime<Utc>) -> Result<RoleSet> {
        self.cascade(Change::Timestamp, now)
    }

    fn renew_root(&mut self, new_key: Option<SigningKeyPair>, now: DateTime<Utc>) -> Result<()> {
        let mut doc = self.store.root.clone();
        doc.clear_signatures();
        doc.signed
            .renew(self.config.expiry.expires_at(RoleType::Root, now));

        if let Some(key) = &new_key {
            for role in RoleType::iter() {
                doc.signed.revoke_key(self.signer.key_id(), role);
                doc.signed.add_key(key.public_key(), key.key_id(), role);
            }
        }

        doc.sign(&self.signer)?;
        if let Some(key) = new_key {
            doc.sign(&key)?;
            info!(
                "Rotated signing key {} -> {}",
                self.signer.key_id(),
                key.key_id()
            );
            self.signer = key;
        }

        info!("Re-signed root at version {}", doc.signed.version());
        self.store.root = doc;
        self.store.mark_dirty(RoleType::Root);
        Ok(())
    }

    fn renew_targets(
        &mut self,
        mapping: Option<BTreeMap<String, TargetFile>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut doc = self.store.targets.clone();
        doc.clear_signatures();
        doc.signed
            .renew(self.config.expiry.expires_at(RoleType::Targets, now));
        if let Some(mapping) = mapping {
            doc.signed.targets = mapping;
        }
        doc.sign(&self.signer)?;

        info!(
            "Re-signed targets at version {} ({} target(s))",
            doc.signed.version(),
            doc.signed.targets.len()
        );
        self.store.targets = doc;
        self.store.mark_dirty(RoleType::Targets);
        Ok(())
    }

    fn renew_snapshot(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut doc = self.store.snapshot.clone();
        doc.clear_signatures();
        doc.signed
            .renew(self.config.expiry.expires_at(RoleType::Snapshot, now));
        doc.signed
            .set_targets_version(self.store.targets.signed.version());
        doc.sign(&self.signer)?;

        info!("Re-signed snapshot at version {}", doc.signed.version());
        self.store.snapshot = doc;
        self.store.mark_dirty(RoleType::Snapshot);
        Ok(())
    }

    fn renew_timestamp(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut doc = self.store.timestamp.clone();
        doc.clear_signatures();
        doc.signed
            .renew(self.config.expiry.expires_at(RoleType::Timestamp, now));
        doc.signed
            .set_snapshot_version(self.store.snapshot.signed.version());
        doc.sign(&self.signer)?;

        info!("Re-signed timestamp at version {}", doc.signed.version());
        self.store.timestamp = doc;
        self.store.mark_dirty(RoleType::Timestamp);
        Ok(())
    }
}
