// tests/http.rs

//! End-to-end upload through the admin router and fetch through the public one.

#![cfg(feature = "server")]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::setup_repo;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use tuf_repo::server::{ServerState, create_admin_router, create_public_router};
use tuf_repo::{RepositoryService, Signed, Targets};

const BOUNDARY: &str = "repo-upload";

fn upload(files: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        // Field name only: the target is named after it
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

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

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_uploaded_targets_are_published() {
    let (_dir, repo) = setup_repo();
    let layout = repo.layout().clone();
    let (handle, _task) = RepositoryService::spawn(repo);
    let admin = create_admin_router(Arc::new(ServerState::new(handle, 1024 * 1024)));
    let public = create_public_router(&layout);

    let response = admin
        .oneshot(upload(&[("a.bin", b"alpha"), ("b.bin", b"bravo")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = get(&public, "/targets/a.bin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"alpha");

    let (status, body) = get(&public, "/metadata/targets.json").await;
    assert_eq!(status, StatusCode::OK);
    let targets = Signed::<Targets>::from_bytes(&body).unwrap();
    assert_eq!(targets.signed.version, 2);
    assert_eq!(
        targets.signed.targets.keys().collect::<Vec<_>>(),
        vec!["a.bin", "b.bin"]
    );

    let (_, body) = get(&public, "/metadata/timestamp.json").await;
    let timestamp: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(timestamp["signed"]["meta"]["snapshot.json"]["version"], 2);
}

#[tokio::test]
async fn test_second_upload_replaces_first() {
    let (_dir, repo) = setup_repo();
    let layout = repo.layout().clone();
    let (handle, _task) = RepositoryService::spawn(repo);
    let state = Arc::new(ServerState::new(handle, 1024 * 1024));
    let public = create_public_router(&layout);

    let first = create_admin_router(state.clone())
        .oneshot(upload(&[("old.bin", b"old")]))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = create_admin_router(state)
        .oneshot(upload(&[("new.bin", b"new")]))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(get(&public, "/targets/old.bin").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&public, "/targets/new.bin").await.1, b"new");
}
