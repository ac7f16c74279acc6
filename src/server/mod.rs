// src/server/mod.rs
//! HTTP front end of the repository
//!
//! Two listeners:
//! - Public: static metadata and target files, plus a health check
//! - Admin: target set uploads, repository status, key rotation
//!
//! Handlers never touch the repository directly; they go through the
//! [`RepositoryHandle`] of the repository service.

mod handlers;
mod routes;

pub use routes::{create_admin_router, create_public_router};

use crate::config::RepoConfig;
use crate::repository::Repository;
use crate::scheduler::run_freshness_loop;
use crate::service::{RepositoryHandle, RepositoryService};
use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::sync::Arc;

/// Shared state of the admin handlers
#[derive(Debug, Clone)]
pub struct ServerState {
    pub handle: RepositoryHandle,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl ServerState {
    pub fn new(handle: RepositoryHandle, max_upload_bytes: usize) -> Self {
        Self {
            handle,
            max_upload_bytes,
        }
    }
}

/// Serve `repo` until either listener fails
pub async fn run_server(config: RepoConfig, repo: Repository) -> Result<()> {
    let bind_addr = config.bind_addr()?;
    let admin_addr = config.admin_bind_addr()?;
    let interval = config.scheduler_interval()?;

    let (handle, service) = RepositoryService::spawn(repo);
    let layout = handle.layout().clone();

    tokio::spawn(run_freshness_loop(handle.clone(), interval));

    let state = Arc::new(ServerState::new(handle, config.max_upload_bytes()));
    let public = create_public_router(&layout);
    let admin = create_admin_router(state);

    let public_listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind public listener on {}", bind_addr))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("Failed to bind admin listener on {}", admin_addr))?;

    tracing::info!("Serving metadata and targets on {}", bind_addr);
    tracing::info!("Accepting uploads on {}", admin_addr);

    tokio::select! {
        result = axum::serve(public_listener, public).into_future() => {
            result.context("Public listener failed")?;
        }
        result = axum::serve(admin_listener, admin).into_future() => {
            result.context("Admin listener failed")?;
        }
        result = service => {
            result.context("Repository service panicked")?;
            anyhow::bail!("Repository service stopped unexpectedly");
        }
    }
    Ok(())
}
