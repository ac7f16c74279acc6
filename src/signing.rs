// src/signing.rs
//! Repository signing identity
//!
//! Provides the Ed25519 key pair every role is signed with. The private key
//! is stored on disk encrypted under a passphrase: the passphrase is
//! stretched with scrypt and the key bytes are sealed with AES-256-GCM.
//! Key ids follow TUF: the SHA-256 of the canonical JSON of the public key
//! object.

use crate::error::{Error, Result};
use crate::filesystem::write_atomic_with_mode;
use crate::hash::sha256;
use crate::metadata::{Signature, canonical_json};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

const ALGORITHM: &str = "ed25519";
const KDF: &str = "scrypt";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Public key object as listed in root metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyValue,
}

/// Public key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Hex-encoded public key bytes
    pub public: String,
}

impl PublicKey {
    /// Wrap an Ed25519 verifying key
    pub fn ed25519(key: &VerifyingKey) -> Self {
        Self {
            keytype: ALGORITHM.to_string(),
            scheme: ALGORITHM.to_string(),
            keyval: KeyValue {
                public: hex::encode(key.as_bytes()),
            },
        }
    }

    /// TUF key id: hex SHA-256 of the key's canonical JSON
    pub fn key_id(&self) -> Result<String> {
        Ok(sha256(&canonical_json(self)?))
    }

    /// Check a hex-encoded signature over `content`
    ///
    /// Returns false for unsupported key types and undecodable input.
    pub fn verify(&self, content: &[u8], signature_hex: &str) -> bool {
        if self.keytype != ALGORITHM || self.scheme != ALGORITHM {
            return false;
        }
        let Ok(key_bytes) = hex::decode(&self.keyval.public) else {
            return false;
        };
        let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(&sig_bytes) else {
            return false;
        };
        key.verify(content, &signature).is_ok()
    }
}

/// Scrypt cost parameters for key file encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

/// The repository's signing key pair
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
    public_key: PublicKey,
    key_id: String,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Result<Self> {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Result<Self> {
        let public_key = PublicKey::ed25519(&signing_key.verifying_key());
        let key_id = public_key.key_id()?;
        Ok(Self {
            signing_key,
            public_key,
            key_id,
        })
    }

    /// TUF key id of this key
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key object for root metadata
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Sign content and return a metadata signature
    pub fn sign(&self, content: &[u8]) -> Signature {
        let signature = self.signing_key.sign(content);
        Signature {
            keyid: self.key_id.clone(),
            sig: hex::encode(signature.to_bytes()),
        }
    }

    /// Save the key pair encrypted under `passphrase`
    ///
    /// The file is written atomically with owner-only permissions.
    pub fn save_encrypted(&self, path: &Path, passphrase: &str, kdf: KdfParams) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let cipher = cipher_for(path, passphrase, &salt, kdf)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &self.signing_key.to_bytes()[..])
            .map_err(|_| key_file_error(path, "encryption failed"))?;

        let key_file = KeyFile {
            algorithm: ALGORITHM.to_string(),
            key_id: self.key_id.clone(),
            kdf: KDF.to_string(),
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            kdf_params: kdf,
        };
        let content = toml::to_string_pretty(&key_file)?;
        write_atomic_with_mode(path, content.as_bytes(), Some(0o600))?;
        Ok(())
    }

    /// Load and decrypt a key pair saved with [`SigningKeyPair::save_encrypted`]
    pub fn load_encrypted(path: &Path, passphrase: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let key_file: KeyFile = toml::from_str(&content)
            .map_err(|e| key_file_error(path, &format!("parse error: {}", e)))?;

        if key_file.algorithm != ALGORITHM {
            return Err(key_file_error(
                path,
                &format!("unsupported key algorithm: {}", key_file.algorithm),
            ));
        }
        if key_file.kdf != KDF {
            return Err(key_file_error(
                path,
                &format!("unsupported key derivation: {}", key_file.kdf),
            ));
        }

        let salt = decode_field(path, "salt", &key_file.salt)?;
        let nonce = decode_field(path, "nonce", &key_file.nonce)?;
        let ciphertext = decode_field(path, "ciphertext", &key_file.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(key_file_error(path, "invalid nonce length"));
        }

        let cipher = cipher_for(path, passphrase, &salt, key_file.kdf_params)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| Error::KeyDecryption)?;

        let key_array: [u8; 32] = plaintext
            .try_into()
            .map_err(|_| key_file_error(path, "invalid key length"))?;
        let keypair = Self::from_signing_key(SigningKey::from_bytes(&key_array))?;

        if keypair.key_id != key_file.key_id {
            return Err(key_file_error(path, "key id does not match key material"));
        }
        Ok(keypair)
    }
}

/// Encrypted key file format
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key_id: String,
    kdf: String,
    salt: String,
    nonce: String,
    ciphertext: String,
    kdf_params: KdfParams,
}

fn cipher_for(path: &Path, passphrase: &str, salt: &[u8], kdf: KdfParams) -> Result<Aes256Gcm> {
    let params = scrypt::Params::new(kdf.log_n, kdf.r, kdf.p, 32)
        .map_err(|e| key_file_error(path, &format!("invalid scrypt parameters: {}", e)))?;
    let mut derived = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut derived)
        .map_err(|e| key_file_error(path, &format!("key derivation failed: {}", e)))?;
    Aes256Gcm::new_from_slice(&derived).map_err(|_| key_file_error(path, "invalid cipher key"))
}

fn decode_field(path: &Path, field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|_| key_file_error(path, &format!("invalid base64 in {}", field)))
}

fn key_file_error(path: &Path, reason: &str) -> Error {
    Error::KeyFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
