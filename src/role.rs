// src/role.rs

//! The four top-level TUF roles
//!
//! The role set is closed: every place that branches on a role matches
//! exhaustively on [`RoleType`], and per-role flags live in a [`RoleSet`]
//! with one field per role instead of a string-keyed map.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// A top-level metadata role
///
/// Variants are declared in trust order, upstream first; `RoleType::iter()`
/// yields them in that order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoleType {
    /// Trust anchor: binds keys to every role
    Root,
    /// Describes the current target files
    Targets,
    /// Pins the trusted targets version
    Snapshot,
    /// Pins the trusted snapshot version; the freshest document
    Timestamp,
}

impl RoleType {
    /// The file name other roles use to refer to this role's document
    ///
    /// Root is referenced as `root.json` even though it is stored
    /// under version-qualified names.
    pub fn meta_path(&self) -> &'static str {
        match self {
            Self::Root => "root.json",
            Self::Targets => "targets.json",
            Self::Snapshot => "snapshot.json",
            Self::Timestamp => "timestamp.json",
        }
    }
}

/// A set of roles, one flag per role
///
/// Used both as the store's dirty flags and as the record of which roles a
/// cascade touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleSet {
    pub root: bool,
    pub targets: bool,
    pub snapshot: bool,
    pub timestamp: bool,
}

impl RoleSet {
    /// The empty set
    pub const fn empty() -> Self {
        Self {
            root: false,
            targets: false,
            snapshot: false,
            timestamp: false,
        }
    }

    /// Every role
    pub const fn all() -> Self {
        Self {
            root: true,
            targets: true,
            snapshot: true,
            timestamp: true,
        }
    }

    pub fn insert(&mut self, role: RoleType) {
        *self.flag_mut(role) = true;
    }

    pub fn remove(&mut self, role: RoleType) {
        *self.flag_mut(role) = false;
    }

    pub fn contains(&self, role: RoleType) -> bool {
        match role {
            RoleType::Root => self.root,
            RoleType::Targets => self.targets,
            RoleType::Snapshot => self.snapshot,
            RoleType::Timestamp => self.timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.root || self.targets || self.snapshot || self.timestamp)
    }

    /// Roles in the set, in trust order
    pub fn iter(&self) -> impl Iterator<Item = RoleType> + '_ {
        RoleType::iter().filter(|role| self.contains(*role))
    }

    fn flag_mut(&mut self, role: RoleType) -> &mut bool {
        match role {
            RoleType::Root => &mut self.root,
            RoleType::Targets => &mut self.targets,
            RoleType::Snapshot => &mut self.snapshot,
            RoleType::Timestamp => &mut self.timestamp,
        }
    }
}

impl FromIterator<RoleType> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleType>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_match_metadata() {
        for role in RoleType::iter() {
            let serialized = serde_json::to_value(role).unwrap();
            assert_eq!(serialized, serde_json::Value::String(role.to_string()));
            assert_eq!(role.meta_path(), format!("{}.json", role));
        }
    }

    #[test]
    fn test_trust_order() {
        let collected: Vec<_> = RoleType::iter().collect();
        assert_eq!(
            collected,
            vec![
                RoleType::Root,
                RoleType::Targets,
                RoleType::Snapshot,
                RoleType::Timestamp
            ]
        );
    }

    #[test]
    fn test_role_set_iteration_is_ordered() {
        let set: RoleSet = [RoleType::Timestamp, RoleType::Root].into_iter().collect();
        let roles: Vec<_> = set.iter().collect();
        assert_eq!(roles, vec![RoleType::Root, RoleType::Timestamp]);
        assert!(!set.contains(RoleType::Targets));
    }

    #[test]
    fn test_role_set_remove() {
        let mut set = RoleSet::all();
        set.remove(RoleType::Snapshot);
        assert!(!set.contains(RoleType::Snapshot));
        set.remove(RoleType::Root);
        set.remove(RoleType::Targets);
        set.remove(RoleType::Timestamp);
        assert!(set.is_empty());
    }
}
