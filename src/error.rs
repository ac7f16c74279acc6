// src/error.rs

//! Error types for the repository library

use crate::role::RoleType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the repository library
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to write TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Invalid key file {path}: {reason}")]
    KeyFile { path: PathBuf, reason: String },

    #[error("Failed to decrypt signing key (wrong passphrase or corrupted key file)")]
    KeyDecryption,

    #[error("Signature verification failed for {role}: {reason}")]
    SignatureInvalid { role: RoleType, reason: String },

    #[error("Signing key {key_id} is not trusted for {role}")]
    UntrustedKey { role: RoleType, key_id: String },

    #[error("No root metadata found in {0}")]
    MissingRoot(PathBuf),

    #[error("Malformed metadata {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("Invalid target name: {0:?}")]
    InvalidTargetName(String),

    #[error("Duplicate target in upload: {0}")]
    DuplicateTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository is locked by another process: {0}")]
    LockHeld(PathBuf),

    #[error("Repository service is no longer running")]
    ServiceClosed,
}
