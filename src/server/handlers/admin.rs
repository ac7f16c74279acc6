// src/server/handlers/admin.rs
//! Repository status and key management endpoints

use super::error_response;
use crate::server::ServerState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /v1/status
///
/// Version, expiry and expiry state of every role.
pub async fn status(State(state): State<Arc<ServerState>>) -> Response {
    match state.handle.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /v1/admin/rotate-key
///
/// Replace the signing key. Returns the old and new key ids and the role
/// versions after every role was re-signed with the new key.
pub async fn rotate_key(State(state): State<Arc<ServerState>>) -> Response {
    match state.handle.rotate_key().await {
        Ok(report) => {
            tracing::info!(
                "Signing key rotated from {} to {}",
                report.previous_key_id,
                report.key_id
            );
            Json(report).into_response()
        }
        Err(e) => {
            tracing::error!("Key rotation failed: {}", e);
            error_response(&e)
        }
    }
}
