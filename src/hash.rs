// src/hash.rs

//! Content hashing for target files
//!
//! Targets metadata records every file's length and a set of digests.
//! Both supported algorithms are computed in a single streaming pass.
//!
//! | Algorithm | Digest length | Metadata key |
//! |-----------|---------------|--------------|
//! | SHA-256   | 32 bytes      | `sha256`     |
//! | SHA-512   | 64 bytes      | `sha512`     |

use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::Path;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the algorithm name as used in metadata
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

/// Length and digests of a piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub length: u64,
    /// Algorithm name -> lowercase hex digest
    pub hashes: BTreeMap<String, String>,
}

/// Streaming hasher that feeds every supported algorithm at once
pub struct Hasher {
    sha256: Sha256,
    sha512: Sha512,
    length: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            sha512: Sha512::new(),
            length: 0,
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.sha512.update(data);
        self.length += data.len() as u64;
    }

    /// Finalize and return length plus all digests
    pub fn finalize(self) -> ContentDigest {
        let mut hashes = BTreeMap::new();
        hashes.insert(
            HashAlgorithm::Sha256.name().to_string(),
            hex::encode(self.sha256.finalize()),
        );
        hashes.insert(
            HashAlgorithm::Sha512.name().to_string(),
            hex::encode(self.sha512.finalize()),
        );
        ContentDigest {
            length: self.length,
            hashes,
        }
    }
}

/// Digest data from a reader
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<ContentDigest> {
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Digest a file, streaming its content
pub fn digest_file(path: &Path) -> io::Result<ContentDigest> {
    let mut file = std::fs::File::open(path)?;
    digest_reader(&mut file)
}

/// Compute a SHA-256 hex digest
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
