// src/server/routes.rs
//! Axum routers for the public and admin listeners

use crate::repository::RepoLayout;
use crate::server::ServerState;
use crate::server::handlers::{admin, upload};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Static metadata and targets, served verbatim from disk
pub fn create_public_router(layout: &RepoLayout) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest_service("/metadata", ServeDir::new(layout.metadata_dir()))
        .nest_service("/targets", ServeDir::new(layout.targets_dir()))
        .layer(TraceLayer::new_for_http())
}

/// Uploads and repository administration
pub fn create_admin_router(state: Arc<ServerState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", post(upload::receive_targets))
        .route("/health", get(health_check))
        .route("/v1/status", get(admin::status))
        .route("/v1/admin/rotate-key", post(admin::rotate_key))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
