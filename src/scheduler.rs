// src/scheduler.rs

//! Freshness scheduler
//!
//! Every cycle re-signs the most upstream expired role (which cascades as
//! usual), then writes out whatever is dirty. Writes that failed in an
//! earlier cycle are retried here too.

use crate::error::{Error, Result};
use crate::repository::{Change, Repository};
use crate::role::{RoleSet, RoleType};
use crate::service::RepositoryHandle;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one scheduler cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// The role found expired, if any
    pub expired: Option<RoleType>,
    /// Roles re-signed this cycle
    pub resigned: RoleSet,
    /// Roles written this cycle
    pub persisted: RoleSet,
    /// Roles still waiting to be written
    pub pending: RoleSet,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.expired.is_none() && self.persisted.is_empty() && self.pending.is_empty()
    }
}

impl Repository {
    /// Run one freshness cycle at `now`
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let expired = self.store().first_expired(now);
        let change = match expired {
            Some(RoleType::Root) => Some(Change::Root { new_key: None }),
            Some(RoleType::Targets) => Some(Change::Targets { rebind: false }),
            Some(RoleType::Snapshot) => Some(Change::Snapshot),
            Some(RoleType::Timestamp) => Some(Change::Timestamp),
            None => None,
        };

        if let Some(role) = expired {
            info!(
                "{} metadata expired at {}, re-signing",
                role,
                self.store().expires(role)
            );
        }
        let resigned = match change {
            Some(change) => self.cascade(change, now)?,
            None => RoleSet::empty(),
        };

        let persisted = self.persist_dirty().written;
        let pending = self.store().dirty();
        if !pending.is_empty() {
            warn!("{} document(s) still unwritten, retrying next cycle", pending.iter().count());
        }

        Ok(TickReport {
            expired,
            resigned,
            persisted,
            pending,
        })
    }
}

/// Keep the repository fresh until the repository service stops
pub async fn run_freshness_loop(handle: RepositoryHandle, interval: Duration) {
    info!("Freshness scheduler running every {:?}", interval);

    loop {
        match handle.tick().await {
            Ok(report) if report.is_idle() => debug!("Freshness check: nothing to do"),
            Ok(report) => debug!("Freshness check: {:?}", report),
            Err(Error::ServiceClosed) => {
                info!("Repository service stopped, ending freshness scheduler");
                return;
            }
            Err(e) => error!("Freshness check failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}
