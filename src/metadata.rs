// src/metadata.rs
//! Signed role metadata documents
//!
//! Each role document is a [`Signed`] envelope around one role payload
//! ([`Root`], [`Targets`], [`Snapshot`], [`Timestamp`]). Signatures cover the
//! canonical JSON (OLPC rules: sorted keys, no insignificant whitespace) of
//! the `signed` object. On disk the envelope is pretty-printed JSON; every
//! map is a `BTreeMap`, so serializing an unchanged document always yields
//! the same bytes.

use crate::error::{Error, Result};
use crate::hash::ContentDigest;
use crate::role::RoleType;
use crate::signing::{PublicKey, SigningKeyPair};
use chrono::{DateTime, Utc};
use olpc_cjson::CanonicalFormatter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use strum::IntoEnumIterator;

/// TUF specification version written into every document
pub const SPEC_VERSION: &str = "1.0.31";

/// Serialize `value` as canonical JSON
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(data)
}

/// Common behavior of every role payload
pub trait Role: Serialize + DeserializeOwned + Clone {
    /// The role this payload belongs to
    const TYPE: RoleType;

    fn version(&self) -> u64;

    fn expires(&self) -> DateTime<Utc>;

    /// Increment the version and move the expiry
    fn renew(&mut self, expires: DateTime<Utc>);

    /// Whether the document is expired at `now` (expiry is inclusive)
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires()
    }
}

macro_rules! impl_role {
    ($ty:ty, $role:expr) => {
        impl Role for $ty {
            const TYPE: RoleType = $role;

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> DateTime<Utc> {
                self.expires
            }

            fn renew(&mut self, expires: DateTime<Utc>) {
                self.version += 1;
                self.expires = expires;
            }
        }
    };
}

/// A signed metadata envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

/// A signature and the key id that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    /// Hex-encoded signature over the canonical form of `signed`
    pub sig: String,
}

impl<T: Role> Signed<T> {
    /// Wrap an unsigned payload
    pub fn new(signed: T) -> Self {
        Self {
            signatures: Vec::new(),
            signed,
        }
    }

    /// Bytes covered by signatures
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(&self.signed)
    }

    /// Add (or replace) the signature made by `key`
    pub fn sign(&mut self, key: &SigningKeyPair) -> Result<()> {
        let bytes = self.canonical_bytes()?;
        self.signatures.retain(|s| s.keyid != key.key_id());
        self.signatures.push(key.sign(&bytes));
        Ok(())
    }

    pub fn clear_signatures(&mut self) {
        self.signatures.clear();
    }

    /// Key ids that produced the attached signatures
    pub fn signer_ids(&self) -> Vec<&str> {
        self.signatures.iter().map(|s| s.keyid.as_str()).collect()
    }

    /// Verify signatures against the key bindings in `root`
    ///
    /// Only signatures by keys `root` authorizes for this role count, and
    /// each key counts once.
    pub fn verify(&self, root: &Root) -> Result<()> {
        let role = T::TYPE;
        let binding = root.roles.get(&role).ok_or_else(|| Error::SignatureInvalid {
            role,
            reason: "role is not defined in root".to_string(),
        })?;
        let bytes = self.canonical_bytes()?;

        let mut valid = BTreeSet::new();
        for signature in &self.signatures {
            if !binding.keyids.contains(&signature.keyid) {
                continue;
            }
            let Some(key) = root.keys.get(&signature.keyid) else {
                continue;
            };
            if key.verify(&bytes, &signature.sig) {
                valid.insert(signature.keyid.as_str());
            }
        }

        let threshold = binding.threshold.max(1);
        if (valid.len() as u64) < threshold {
            return Err(Error::SignatureInvalid {
                role,
                reason: format!(
                    "{} valid signature(s), threshold is {}",
                    valid.len(),
                    threshold
                ),
            });
        }
        Ok(())
    }

    /// Storage representation
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read and parse a stored document
    ///
    /// Parse failures and version 0 are reported as malformed metadata.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let doc = Self::from_bytes(&bytes).map_err(|e| Error::MalformedMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.signed.version() == 0 {
            return Err(Error::MalformedMetadata {
                path: path.to_path_buf(),
                reason: "version must be at least 1".to_string(),
            });
        }
        Ok(doc)
    }
}

mod expiry_format {
    //! TUF timestamps: `YYYY-MM-DDTHH:MM:SSZ`, whole seconds, UTC

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Keys authorized for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u64,
}

/// Root role: the trust anchor binding keys to roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "root")]
pub struct Root {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    pub consistent_snapshot: bool,
    pub keys: BTreeMap<String, PublicKey>,
    pub roles: BTreeMap<RoleType, RoleKeys>,
}

impl_role!(Root, RoleType::Root);

impl Root {
    /// Version 1 root with every role defined but no keys bound
    pub fn new(expires: DateTime<Utc>) -> Self {
        let roles = RoleType::iter()
            .map(|role| {
                (
                    role,
                    RoleKeys {
                        keyids: Vec::new(),
                        threshold: 1,
                    },
                )
            })
            .collect();
        Self {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            consistent_snapshot: false,
            keys: BTreeMap::new(),
            roles,
        }
    }

    /// Authorize `key` for `role`
    pub fn add_key(&mut self, key: &PublicKey, key_id: &str, role: RoleType) {
        self.keys.insert(key_id.to_string(), key.clone());
        let binding = self.roles.entry(role).or_insert_with(|| RoleKeys {
            keyids: Vec::new(),
            threshold: 1,
        });
        if !binding.keyids.iter().any(|id| id == key_id) {
            binding.keyids.push(key_id.to_string());
        }
    }

    /// Remove `key_id` from `role`; drop the key object once no role uses it
    pub fn revoke_key(&mut self, key_id: &str, role: RoleType) {
        if let Some(binding) = self.roles.get_mut(&role) {
            binding.keyids.retain(|id| id != key_id);
        }
        let still_used = self
            .roles
            .values()
            .any(|binding| binding.keyids.iter().any(|id| id == key_id));
        if !still_used {
            self.keys.remove(key_id);
        }
    }

    /// Key ids authorized for `role`
    pub fn role_key_ids(&self, role: RoleType) -> &[String] {
        self.roles
            .get(&role)
            .map(|binding| binding.keyids.as_slice())
            .unwrap_or(&[])
    }

    pub fn authorizes(&self, role: RoleType, key_id: &str) -> bool {
        self.role_key_ids(role).iter().any(|id| id == key_id)
    }
}

/// Description of one target file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
}

impl From<ContentDigest> for TargetFile {
    fn from(digest: ContentDigest) -> Self {
        Self {
            length: digest.length,
            hashes: digest.hashes,
        }
    }
}

/// Targets role: the authoritative list of target files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "targets")]
pub struct Targets {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    pub targets: BTreeMap<String, TargetFile>,
}

impl_role!(Targets, RoleType::Targets);

impl Targets {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            targets: BTreeMap::new(),
        }
    }
}

/// Version pointer to another metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
}

/// Snapshot role: pins the trusted targets version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "snapshot")]
pub struct Snapshot {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl_role!(Snapshot, RoleType::Snapshot);

impl Snapshot {
    /// Version 1 snapshot pointing at targets version 1
    pub fn new(expires: DateTime<Utc>) -> Self {
        let mut snapshot = Self {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta: BTreeMap::new(),
        };
        snapshot.set_targets_version(1);
        snapshot
    }

    pub fn targets_version(&self) -> Option<u64> {
        self.meta
            .get(RoleType::Targets.meta_path())
            .map(|meta| meta.version)
    }

    pub fn set_targets_version(&mut self, version: u64) {
        self.meta
            .insert(RoleType::Targets.meta_path().to_string(), MetaFile { version });
    }
}

/// Timestamp role: pins the trusted snapshot version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "timestamp")]
pub struct Timestamp {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl_role!(Timestamp, RoleType::Timestamp);

impl Timestamp {
    /// Version 1 timestamp pointing at snapshot version 1
    pub fn new(expires: DateTime<Utc>) -> Self {
        let mut timestamp = Self {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta: BTreeMap::new(),
        };
        timestamp.set_snapshot_version(1);
        timestamp
    }

    pub fn snapshot_version(&self) -> Option<u64> {
        self.meta
            .get(RoleType::Snapshot.meta_path())
            .map(|meta| meta.version)
    }

    pub fn set_snapshot_version(&mut self, version: u64) {
        self.meta
            .insert(RoleType::Snapshot.meta_path().to_string(), MetaFile { version });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
    }

    fn signed_root(key: &SigningKeyPair) -> Signed<Root> {
        let mut root = Root::new(expiry());
        for role in RoleType::iter() {
            root.add_key(key.public_key(), key.key_id(), role);
        }
        let mut doc = Signed::new(root);
        doc.sign(key).unwrap();
        doc
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = serde_json::json!({"b": 1, "a": {"d": true, "c": "x"}});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(bytes, br#"{"a":{"c":"x","d":true},"b":1}"#);
    }

    #[test]
    fn test_root_serialization_shape() {
        let key = SigningKeyPair::generate().unwrap();
        let doc = signed_root(&key);
        let value: serde_json::Value = serde_json::from_slice(&doc.to_bytes().unwrap()).unwrap();

        assert_eq!(value["signed"]["_type"], "root");
        assert_eq!(value["signed"]["expires"], "2030-01-02T03:04:05Z");
        assert_eq!(value["signed"]["consistent_snapshot"], false);
        assert_eq!(value["signed"]["roles"]["timestamp"]["threshold"], 1);
        assert_eq!(
            value["signed"]["roles"]["targets"]["keyids"][0],
            key.key_id()
        );
        assert_eq!(value["signatures"][0]["keyid"], key.key_id());
    }

    #[test]
    fn test_storage_round_trip_is_byte_stable() {
        let key = SigningKeyPair::generate().unwrap();
        let doc = signed_root(&key);

        let first = doc.to_bytes().unwrap();
        let parsed = Signed::<Root>::from_bytes(&first).unwrap();
        let second = parsed.to_bytes().unwrap();

        assert_eq!(first, second);
        assert_eq!(parsed, doc);
        assert_eq!(
            parsed.canonical_bytes().unwrap(),
            doc.canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_verify_accepts_bound_key() {
        let key = SigningKeyPair::generate().unwrap();
        let root = signed_root(&key);
        root.verify(&root.signed).unwrap();

        let mut targets = Signed::new(Targets::new(expiry()));
        targets.sign(&key).unwrap();
        targets.verify(&root.signed).unwrap();
    }

    #[test]
    fn test_verify_rejects_unbound_key_and_tampering() {
        let key = SigningKeyPair::generate().unwrap();
        let stranger = SigningKeyPair::generate().unwrap();
        let root = signed_root(&key);

        let mut targets = Signed::new(Targets::new(expiry()));
        targets.sign(&stranger).unwrap();
        assert!(matches!(
            targets.verify(&root.signed),
            Err(Error::SignatureInvalid { role: RoleType::Targets, .. })
        ));

        let mut snapshot = Signed::new(Snapshot::new(expiry()));
        snapshot.sign(&key).unwrap();
        snapshot.signed.set_targets_version(7);
        assert!(snapshot.verify(&root.signed).is_err());
    }

    #[test]
    fn test_sign_replaces_own_signature() {
        let key = SigningKeyPair::generate().unwrap();
        let mut doc = Signed::new(Timestamp::new(expiry()));
        doc.sign(&key).unwrap();
        doc.sign(&key).unwrap();
        assert_eq!(doc.signatures.len(), 1);

        doc.clear_signatures();
        assert!(doc.signatures.is_empty());
    }

    #[test]
    fn test_renew_bumps_version_and_expiry() {
        let mut timestamp = Timestamp::new(expiry());
        let later = expiry() + Duration::days(1);
        timestamp.renew(later);

        assert_eq!(timestamp.version(), 2);
        assert_eq!(timestamp.expires(), later);
        assert!(!timestamp.is_expired(later - Duration::seconds(1)));
        assert!(timestamp.is_expired(later));
    }

    #[test]
    fn test_revoke_key_drops_unused_key_object() {
        let old = SigningKeyPair::generate().unwrap();
        let new = SigningKeyPair::generate().unwrap();
        let mut root = signed_root(&old).signed;

        for role in RoleType::iter() {
            root.revoke_key(old.key_id(), role);
            root.add_key(new.public_key(), new.key_id(), role);
        }

        assert!(!root.keys.contains_key(old.key_id()));
        for role in RoleType::iter() {
            assert_eq!(root.role_key_ids(role), [new.key_id().to_string()]);
        }
    }

    #[test]
    fn test_pointer_defaults() {
        assert_eq!(Snapshot::new(expiry()).targets_version(), Some(1));
        assert_eq!(Timestamp::new(expiry()).snapshot_version(), Some(1));
    }

    #[test]
    fn test_wrong_role_type_is_rejected() {
        let bytes = Signed::new(Snapshot::new(expiry())).to_bytes().unwrap();
        assert!(Signed::<Timestamp>::from_bytes(&bytes).is_err());
    }
}
