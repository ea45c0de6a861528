//! Integration test for the HTTP ingress surface, exercised end-to-end
//! against the in-memory job store: submit a transcode request over HTTP,
//! then fetch its status back through the same router.

use std::sync::Arc;

use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use transcode_service::ingress::{http, AdmissionService};
use transcode_service::job_store::InMemoryJobStore;
use transcode_service::queue::BoundedQueue;

fn router() -> axum::Router {
    let jobs = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(BoundedQueue::new(10));
    let admission = Arc::new(AdmissionService::new(jobs.clone(), queue));
    http::router(http::HttpIngressState {
        admission,
        jobs,
        transcode_stats: None,
        hls_stats: None,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn submits_a_job_and_reads_its_status_back() {
    let app = router();

    let user_uuid = Uuid::new_v4();
    let video_uuid = Uuid::new_v4();
    let request_body = json!({
        "user_uuid": user_uuid,
        "video_uuid": video_uuid,
        "video_push_uuid": null,
        "input_path": "uploads/u1/v1.mov",
        "target_resolution": "720p",
        "target_bitrate": "2000k",
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/transcode")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    let job_uuid = submitted["task_uuid"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{job_uuid}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["status"], "PENDING");
    assert_eq!(status["progress"], 0);
}

#[tokio::test]
async fn metrics_reports_absent_pools_as_null_when_not_wired() {
    let app = router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["transcode"].is_null());
    assert!(body["hls"].is_null());
}

#[tokio::test]
async fn unknown_job_uuid_returns_404() {
    let app = router();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{}", Uuid::new_v4()))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_malformed_resolution_with_422() {
    let app = router();
    let request_body = json!({
        "user_uuid": Uuid::new_v4(),
        "video_uuid": Uuid::new_v4(),
        "video_push_uuid": null,
        "input_path": "uploads/u1/v1.mov",
        "target_resolution": "8k",
        "target_bitrate": "2000k",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/transcode")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
