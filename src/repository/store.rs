// src/repository/store.rs

//! In-memory holder of the four current role documents

use crate::metadata::{Role, Root, Signed, Snapshot, Targets, Timestamp};
use crate::role::{RoleSet, RoleType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::IntoEnumIterator;

/// The current document of every role plus the roles awaiting persistence
#[derive(Debug, Clone)]
pub struct RoleStore {
    pub root: Signed<Root>,
    pub targets: Signed<Targets>,
    pub snapshot: Signed<Snapshot>,
    pub timestamp: Signed<Timestamp>,
    dirty: RoleSet,
}

impl RoleStore {
    /// Wrap loaded or freshly built documents; nothing starts dirty
    pub fn new(
        root: Signed<Root>,
        targets: Signed<Targets>,
        snapshot: Signed<Snapshot>,
        timestamp: Signed<Timestamp>,
    ) -> Self {
        Self {
            root,
            targets,
            snapshot,
            timestamp,
            dirty: RoleSet::empty(),
        }
    }

    pub fn version(&self, role: RoleType) -> u64 {
        match role {
            RoleType::Root => self.root.signed.version(),
            RoleType::Targets => self.targets.signed.version(),
            RoleType::Snapshot => self.snapshot.signed.version(),
            RoleType::Timestamp => self.timestamp.signed.version(),
        }
    }

    pub fn expires(&self, role: RoleType) -> DateTime<Utc> {
        match role {
            RoleType::Root => self.root.signed.expires(),
            RoleType::Targets => self.targets.signed.expires(),
            RoleType::Snapshot => self.snapshot.signed.expires(),
            RoleType::Timestamp => self.timestamp.signed.expires(),
        }
    }

    pub fn is_expired(&self, role: RoleType, now: DateTime<Utc>) -> bool {
        now >= self.expires(role)
    }

    /// The most upstream expired role at `now`, if any
    pub fn first_expired(&self, now: DateTime<Utc>) -> Option<RoleType> {
        RoleType::iter().find(|role| self.is_expired(*role, now))
    }

    pub fn mark_dirty(&mut self, role: RoleType) {
        self.dirty.insert(role);
    }

    pub fn clear_dirty(&mut self, role: RoleType) {
        self.dirty.remove(role);
    }

    pub fn dirty(&self) -> RoleSet {
        self.dirty
    }

    /// Whether the snapshot and timestamp pointers match the current versions
    pub fn is_consistent(&self) -> bool {
        self.snapshot.signed.targets_version() == Some(self.targets.signed.version)
            && self.timestamp.signed.snapshot_version() == Some(self.snapshot.signed.version)
    }

    /// Current versions of every role
    pub fn versions(&self) -> RoleVersions {
        RoleVersions {
            root: self.version(RoleType::Root),
            targets: self.version(RoleType::Targets),
            snapshot: self.version(RoleType::Snapshot),
            timestamp: self.version(RoleType::Timestamp),
        }
    }

    /// Version, expiry and freshness of every role at `now`
    pub fn status(&self, now: DateTime<Utc>) -> RepoStatus {
        let roles = RoleType::iter()
            .map(|role| RoleStatus {
                role,
                version: self.version(role),
                expires: self.expires(role),
                expired: self.is_expired(role, now),
            })
            .collect();

        RepoStatus {
            key_ids: self.root.signed.role_key_ids(RoleType::Root).to_vec(),
            target_count: self.targets.signed.targets.len(),
            consistent: self.is_consistent(),
            roles,
        }
    }
}

/// Version numbers of all four roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleVersions {
    pub root: u64,
    pub targets: u64,
    pub snapshot: u64,
    pub timestamp: u64,
}

/// State of one role
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleStatus {
    pub role: RoleType,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub expired: bool,
}

/// Repository state as reported by `GET /v1/status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoStatus {
    pub key_ids: Vec<String>,
    pub target_count: usize,
    pub consistent: bool,
    pub roles: Vec<RoleStatus>,
}
