// src/server/handlers/upload.rs
//! Target set upload endpoint

use super::error_response;
use crate::error::Error;
use crate::repository::{RoleVersions, StagedTargets};
use crate::server::ServerState;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Response for a completed upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub targets: Vec<String>,
    pub versions: RoleVersions,
}

/// Why an upload was not staged
enum UploadError {
    /// The request body could not be read as multipart
    Multipart(MultipartError),
    Repository(Error),
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart(err)
    }
}

impl From<Error> for UploadError {
    fn from(err: Error) -> Self {
        Self::Repository(err)
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        Self::Repository(Error::Io(err))
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            Self::Multipart(err) => {
                let (status, code) = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    (StatusCode::PAYLOAD_TOO_LARGE, "upload_too_large")
                } else {
                    (StatusCode::BAD_REQUEST, "malformed_upload")
                };
                let error = serde_json::json!({
                    "error": code,
                    "message": err.body_text(),
                });
                (status, Json(error)).into_response()
            }
            Self::Repository(err) => error_response(&err),
        }
    }
}

/// POST /
///
/// Replace the whole target set with the files in a multipart form. Each
/// part is one target, named by its file name or else its field name.
/// Responds once the new set is signed and written:
/// - 200 OK with the target names and new role versions
/// - 400 Bad Request for unreadable bodies and bad or duplicate names
/// - 413 Payload Too Large past `server.max_upload_mb`
/// - 500 Internal Server Error if re-signing or writing failed
///
/// A rejected upload leaves the previous target set live.
pub async fn receive_targets(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Response {
    let mut staged = match StagedTargets::create(state.handle.layout()).await {
        Ok(staged) => staged,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = stage_parts(&mut staged, &mut multipart).await {
        warn!("Rejected upload: {}", describe(&e));
        return e.into_response();
    }
    info!(
        "Received {} target(s), {} bytes",
        staged.len(),
        staged.total_bytes()
    );

    // The service takes over the staging directory along with the request
    match state.handle.replace_targets(staged).await {
        Ok(report) => Json(UploadResponse {
            status: "received",
            targets: report.targets,
            versions: report.versions,
        })
        .into_response(),
        Err(e) => {
            warn!("Failed to publish uploaded targets: {}", e);
            error_response(&e)
        }
    }
}

async fn stage_parts(
    staged: &mut StagedTargets,
    multipart: &mut Multipart,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or_default()
            .to_string();

        let mut file = staged.create_file(&name).await?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
            staged.record_bytes(chunk.len() as u64);
        }
        file.flush().await?;
    }
    Ok(())
}

fn describe(err: &UploadError) -> String {
    match err {
        UploadError::Multipart(e) => e.body_text(),
        UploadError::Repository(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::open_test_repo;
    use crate::server::create_admin_router;
    use crate::service::RepositoryService;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "tuf-test-boundary";

    fn multipart_body(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    name
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_upload_replaces_targets() {
        let (dir, repo) = open_test_repo();
        let (handle, _task) = RepositoryService::spawn(repo);
        let app = create_admin_router(Arc::new(ServerState::new(handle, 1024 * 1024)));

        let body = multipart_body(&[("a.bin", b"alpha"), ("b.bin", b"beta!!")]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "received");
        assert_eq!(json["targets"], serde_json::json!(["a.bin", "b.bin"]));
        assert_eq!(json["versions"]["targets"], 2);
        assert_eq!(json["versions"]["snapshot"], 2);
        assert_eq!(json["versions"]["timestamp"], 2);
        assert_eq!(json["versions"]["root"], 1);

        let targets = dir.path().join("targets");
        assert_eq!(std::fs::read(targets.join("b.bin")).unwrap(), b"beta!!");
    }

    #[tokio::test]
    async fn test_invalid_name_keeps_previous_targets() {
        let (dir, repo) = open_test_repo();
        std::fs::write(dir.path().join("targets").join("keep.bin"), b"keep").unwrap();
        let (handle, _task) = RepositoryService::spawn(repo);
        let app = create_admin_router(Arc::new(ServerState::new(handle.clone(), 1024 * 1024)));

        let body = multipart_body(&[("ok.bin", b"1"), ("..", b"2")]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "invalid_target_name");

        assert!(dir.path().join("targets").join("keep.bin").exists());
        let status = handle.status().await.unwrap();
        assert!(status.roles.iter().all(|role| role.version == 1));

        // No staging directory is left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains("staging"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let (_dir, repo) = open_test_repo();
        let (handle, _task) = RepositoryService::spawn(repo);
        let app = create_admin_router(Arc::new(ServerState::new(handle, 1024 * 1024)));

        let body = multipart_body(&[("a.bin", b"1"), ("a.bin", b"2")]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "duplicate_target");
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let (_dir, repo) = open_test_repo();
        let (handle, _task) = RepositoryService::spawn(repo);
        let app = create_admin_router(Arc::new(ServerState::new(handle.clone(), 64)));

        let big = vec![0x5au8; 4096];
        let body = multipart_body(&[("big.bin", &big)]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"], "upload_too_large");
        assert_eq!(handle.status().await.unwrap().target_count, 0);
    }

    #[tokio::test]
    async fn test_truncated_body_is_rejected() {
        let (_dir, repo) = open_test_repo();
        let (handle, _task) = RepositoryService::spawn(repo);
        let app = create_admin_router(Arc::new(ServerState::new(handle.clone(), 1024 * 1024)));

        let mut body = multipart_body(&[("a.bin", b"complete")]);
        body.truncate(body.len() - 20);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "malformed_upload");
        assert_eq!(handle.status().await.unwrap().target_count, 0);
    }
}
