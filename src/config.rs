// src/config.rs
//! Repository configuration
//!
//! Every setting has a default, so running without a config file gives the
//! standard layout. A TOML file may override any subset:
//! - [server] - Public and admin bind addresses
//! - [storage] - Repository root directory
//! - [expiry] - Role lifetimes in days
//! - [scheduler] - Freshness check interval
//! - [signing] - Key file passphrase and key derivation cost

use crate::error::{Error, Result};
use crate::role::RoleType;
use crate::signing::KdfParams;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::IntoEnumIterator;

/// Passphrase protecting the signing key when none is configured
pub const DEFAULT_KEY_PASSPHRASE: &str = "ga>*{0ZyS}LYT(9V9U";

/// Longest accepted role lifetime, in days
pub const MAX_EXPIRY_DAYS: u32 = 36_500;

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub expiry: ExpirySection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub signing: SigningSection,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Public bind address (static metadata and targets)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Admin bind address (target uploads, status, key rotation)
    #[serde(default = "default_admin_bind")]
    pub admin_bind: String,

    /// Largest accepted upload request in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_bind: default_admin_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_bind() -> String {
    "127.0.0.1:6006".to_string()
}

fn default_max_upload_mb() -> usize {
    1024
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Repository root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("repo")
}

/// Role lifetimes in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExpirySection {
    #[serde(default = "default_root_days")]
    pub root: u32,
    #[serde(default = "default_targets_days")]
    pub targets: u32,
    #[serde(default = "default_snapshot_days")]
    pub snapshot: u32,
    #[serde(default = "default_timestamp_days")]
    pub timestamp: u32,
}

impl Default for ExpirySection {
    fn default() -> Self {
        Self {
            root: default_root_days(),
            targets: default_targets_days(),
            snapshot: default_snapshot_days(),
            timestamp: default_timestamp_days(),
        }
    }
}

fn default_root_days() -> u32 {
    365
}

fn default_targets_days() -> u32 {
    30
}

fn default_snapshot_days() -> u32 {
    30
}

fn default_timestamp_days() -> u32 {
    1
}

impl ExpirySection {
    /// Lifetime of `role` in days
    pub fn days(&self, role: RoleType) -> u32 {
        match role {
            RoleType::Root => self.root,
            RoleType::Targets => self.targets,
            RoleType::Snapshot => self.snapshot,
            RoleType::Timestamp => self.timestamp,
        }
    }

    /// Expiry for a document of `role` signed at `now`, in whole seconds
    pub fn expires_at(&self, role: RoleType, now: DateTime<Utc>) -> DateTime<Utc> {
        now.trunc_subsecs(0) + chrono::Duration::days(i64::from(self.days(role)))
    }
}

/// Scheduler configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Pause between freshness checks (e.g., "10s", "1m")
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> String {
    "10s".to_string()
}

/// Signing configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SigningSection {
    /// Passphrase the key file is encrypted under
    #[serde(default = "default_passphrase")]
    pub passphrase: String,

    /// Scrypt cost (log2 N) used when writing a new key file
    #[serde(default = "default_kdf_log_n")]
    pub kdf_log_n: u8,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            passphrase: default_passphrase(),
            kdf_log_n: default_kdf_log_n(),
        }
    }
}

fn default_passphrase() -> String {
    DEFAULT_KEY_PASSPHRASE.to_string()
}

fn default_kdf_log_n() -> u8 {
    KdfParams::default().log_n
}

impl SigningSection {
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            log_n: self.kdf_log_n,
            ..KdfParams::default()
        }
    }
}

impl RepoConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RepoConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.admin_bind_addr()?;

        for role in RoleType::iter() {
            let days = self.expiry.days(role);
            if days == 0 || days > MAX_EXPIRY_DAYS {
                return Err(Error::Config(format!(
                    "expiry.{} must be between 1 and {} days, got {}",
                    role, MAX_EXPIRY_DAYS, days
                )));
            }
        }

        if self.server.max_upload_mb == 0 {
            return Err(Error::Config(
                "server.max_upload_mb must be greater than zero".to_string(),
            ));
        }

        if self.scheduler_interval()?.is_zero() {
            return Err(Error::Config(
                "scheduler.interval must be greater than zero".to_string(),
            ));
        }

        if !(1..=20).contains(&self.signing.kdf_log_n) {
            return Err(Error::Config(format!(
                "signing.kdf_log_n must be between 1 and 20, got {}",
                self.signing.kdf_log_n
            )));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|_| Error::Config(format!("Invalid server.bind address: {}", self.server.bind)))
    }

    pub fn admin_bind_addr(&self) -> Result<SocketAddr> {
        self.server.admin_bind.parse().map_err(|_| {
            Error::Config(format!(
                "Invalid server.admin_bind address: {}",
                self.server.admin_bind
            ))
        })
    }

    pub fn scheduler_interval(&self) -> Result<Duration> {
        parse_duration(&self.scheduler.interval)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Get the storage root directory
    pub fn storage_root(&self) -> &Path {
        &self.storage.root
    }
}

/// Parse a human-readable duration string (e.g., "15m", "1h", "30s")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('d') {
        (num, 24 * 60 * 60)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid duration: {}", s)))?;
    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("Duration out of range: {}", s)))?;

    Ok(Duration::from_secs(secs))
}
