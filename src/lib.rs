// src/lib.rs

//! TUF Update Repository
//!
//! Maintains the four signed TUF roles (root, targets, snapshot, timestamp)
//! for a directory of target files and keeps them valid over time.
//!
//! # Architecture
//!
//! - One signing key, bound to every role in root
//! - Cascading re-sign: a change to a role re-signs every role pointing at it
//! - Freshness scheduler: expired roles are re-signed automatically
//! - Single owner: all mutation goes through the repository service
//! - Atomic publication: documents and target sets are swapped in by rename

pub mod config;
mod error;
pub mod filesystem;
pub mod hash;
pub mod metadata;
pub mod repository;
pub mod role;
pub mod scheduler;
pub mod service;
pub mod signing;

#[cfg(feature = "server")]
pub mod server;

pub use config::RepoConfig;
pub use error::{Error, Result};
pub use metadata::{Role, Root, Signed, Snapshot, Targets, Timestamp};
pub use repository::{Change, RepoLayout, RepoStatus, Repository, RoleVersions};
pub use role::{RoleSet, RoleType};
pub use scheduler::{TickReport, run_freshness_loop};
pub use service::{RepositoryHandle, RepositoryService};
pub use signing::{KdfParams, PublicKey, SigningKeyPair};
