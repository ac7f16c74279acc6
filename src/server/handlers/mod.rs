// src/server/handlers/mod.rs
//! HTTP request handlers for the admin listener

pub mod admin;
pub mod upload;

use crate::error::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// JSON error body for a repository error
pub(crate) fn error_response(err: &Error) -> Response {
    let (status, code) = match err {
        Error::InvalidTargetName(_) => (StatusCode::BAD_REQUEST, "invalid_target_name"),
        Error::DuplicateTarget(_) => (StatusCode::BAD_REQUEST, "duplicate_target"),
        Error::ServiceClosed => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    let error = serde_json::json!({
        "error": code,
        "message": err.to_string(),
    });
    (status, Json(error)).into_response()
}
