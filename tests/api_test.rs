//! HTTP surface driven in-process through the axum router.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use helpers::{PanickingOcr, SlowOcr};
use image_insight::app_state::AppState;
use image_insight::config::AppConfig;
use image_insight::models::api::{JobStatusResponse, UploadResponse};
use image_insight::models::job::JobStatus;
use image_insight::models::pipeline::StepName;
use image_insight::routes::api_router;
use image_insight::services::heuristics::PLACEHOLDER_OCR_TEXT;
use image_insight::services::providers::{Capability, Providers};
use image_insight::services::storage::LocalStorage;

const BOUNDARY: &str = "image-insight-test-boundary";

fn offline_config(dir: &std::path::Path) -> AppConfig {
    AppConfig::offline(dir.join("uploads"), dir.join("store"))
}

fn app(state: AppState) -> Router {
    api_router(state, 1024 * 1024)
}

fn multipart_upload(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/images/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Poll the status endpoint until the job is terminal.
async fn wait_for_terminal(app: &Router, id: uuid::Uuid) -> (JobStatusResponse, Bytes) {
    for _ in 0..200 {
        let (status, body) = get(app, &format!("/api/images/status/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: JobStatusResponse = serde_json::from_slice(&body).unwrap();
        if parsed.status.is_terminal() {
            return (parsed, body);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state);

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pendingJobs"], 0);
    assert_eq!(json["providers"]["ocr"], false);
    assert_eq!(json["providers"]["objectStorage"], false);
}

#[tokio::test]
async fn test_upload_without_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state);

    let (status, body) = send(&app, multipart_upload("document", "a.png", b"bytes")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_with_empty_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state.clone());

    let (status, body) = send(&app, multipart_upload("image", "empty.png", b"")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "No file uploaded");
    assert_eq!(state.jobs.pending_count().await, 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state);

    let (status, _) = get(&app, &format!("/api/images/status/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/api/images/status/not-a-job").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Not found");
}

#[tokio::test]
async fn test_upload_runs_to_done_without_providers() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state.clone());

    let (status, body) = send(&app, multipart_upload("image", "Receipt.PNG", b"fake png")).await;
    assert_eq!(status, StatusCode::OK);
    let upload: UploadResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(upload.filename, format!("{}.png", upload.id));

    let (job, first_body) = wait_for_terminal(&app, upload.id).await;

    assert_eq!(job.status, JobStatus::Done);
    assert!(job.error.is_none());
    let result = job.result.expect("done job has a result");
    assert_eq!(result.extracted_text, PLACEHOLDER_OCR_TEXT);
    assert_eq!(result.detected_language, "es");
    assert_eq!(result.classification, "General");
    assert_eq!(result.steps.len(), 7);

    // Terminal jobs read back identically.
    let (_, second_body) = get(&app, &format!("/api/images/status/{}", upload.id)).await;
    assert_eq!(first_body, second_body);

    // The staged upload is cleaned up, the stored artifact remains.
    state.runner.shutdown().await;
    assert!(!dir.path().join("uploads").join(&upload.filename).exists());
    assert!(dir.path().join("store").join(&upload.filename).exists());
}

#[tokio::test]
async fn test_job_deadline_marks_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(dir.path());
    config.job_deadline_secs = 1;
    let providers = Providers {
        ocr: Capability::Configured(Arc::new(SlowOcr(Duration::from_secs(20)))),
        ..Default::default()
    };
    let state = AppState::with_parts(
        &config,
        Arc::new(LocalStorage::new(dir.path().join("store"))),
        providers,
    );
    let app = app(state);

    let (status, body) = send(&app, multipart_upload("image", "slow.png", b"img")).await;
    assert_eq!(status, StatusCode::OK);
    let upload: UploadResponse = serde_json::from_slice(&body).unwrap();

    let (job, body) = wait_for_terminal(&app, upload.id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.result.is_none());
    assert!(job.error.unwrap().contains("deadline"));
    // Stages finished before the deadline are still reported.
    let names: Vec<StepName> = job.steps.iter().map(|s| s.name).collect();
    assert_eq!(names, vec![StepName::Upload, StepName::GenerateSas]);
    // Well-formed JSON error object with no result field.
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "error");
    assert!(json.get("result").is_none());
}

#[tokio::test]
async fn test_upload_after_shutdown_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::from_config(&offline_config(dir.path())).unwrap();
    let app = app(state.clone());

    state.runner.shutdown().await;
    let (status, _) = send(&app, multipart_upload("image", "late.png", b"img")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(state.jobs.pending_count().await, 0);
}

#[tokio::test]
async fn test_panicking_provider_still_ends_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let providers = Providers {
        ocr: Capability::Configured(Arc::new(PanickingOcr)),
        ..Default::default()
    };
    let state = AppState::with_parts(
        &config,
        Arc::new(LocalStorage::new(dir.path().join("store"))),
        providers,
    );
    let app = app(state.clone());

    let (status, body) = send(&app, multipart_upload("image", "crash.png", b"img")).await;
    assert_eq!(status, StatusCode::OK);
    let upload: UploadResponse = serde_json::from_slice(&body).unwrap();

    state.runner.shutdown().await;
    let (job, _) = wait_for_terminal(&app, upload.id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.unwrap().contains("ocr client bug"));
    assert_eq!(job.steps.len(), 2);
    assert_eq!(state.jobs.pending_count().await, 0);
    assert!(!dir.path().join("uploads").join(&upload.filename).exists());
}
