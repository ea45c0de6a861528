use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::job_store::TranscodeJobRepository;
use crate::worker::WorkerStats;

use super::admission::{AdmissionRequest, AdmissionService};

#[derive(Clone)]
pub struct HttpIngressState {
    pub admission: Arc<AdmissionService>,
    pub jobs: Arc<dyn TranscodeJobRepository>,
    /// Worker-pool counters for the debug `/metrics` endpoint. `None` in
    /// contexts (tests, ingress-only deployments) with no pools to report on.
    pub transcode_stats: Option<Arc<WorkerStats>>,
    pub hls_stats: Option<Arc<WorkerStats>>,
}

pub fn router(state: HttpIngressState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/v1/transcode", post(submit_transcode))
        .route("/api/v1/jobs/:job_uuid", get(get_job_status))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(state): State<HttpIngressState>) -> impl IntoResponse {
    match state.jobs.query_by_status(crate::model::TranscodeStatus::Pending, 1).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Serialize)]
struct PoolStats {
    processed: u64,
    successful: u64,
    failed: u64,
    currently_running: u64,
}

impl From<&WorkerStats> for PoolStats {
    fn from(stats: &WorkerStats) -> Self {
        use std::sync::atomic::Ordering;
        Self {
            processed: stats.processed.load(Ordering::Relaxed),
            successful: stats.successful.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            currently_running: stats.currently_running.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
struct MetricsReply {
    transcode: Option<PoolStats>,
    hls: Option<PoolStats>,
}

async fn metrics(State(state): State<HttpIngressState>) -> impl IntoResponse {
    Json(MetricsReply {
        transcode: state.transcode_stats.as_deref().map(PoolStats::from),
        hls: state.hls_stats.as_deref().map(PoolStats::from),
    })
}

#[derive(Debug, Deserialize)]
struct SubmitTranscodeBody {
    user_uuid: Uuid,
    video_uuid: Uuid,
    video_push_uuid: Option<Uuid>,
    input_path: String,
    target_resolution: String,
    target_bitrate: String,
}

#[derive(Debug, Serialize)]
struct SubmitTranscodeReply {
    task_uuid: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct JobStatusReply {
    job_uuid: Uuid,
    status: String,
    progress: u8,
    error_message: Option<String>,
    output_object_key: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidParam(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Job(crate::error::JobStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Queue(crate::error::QueueError::Full) | AppError::Queue(crate::error::QueueError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

async fn submit_transcode(
    State(state): State<HttpIngressState>,
    Json(body): Json<SubmitTranscodeBody>,
) -> Result<Json<SubmitTranscodeReply>, AppError> {
    let job = state
        .admission
        .admit(AdmissionRequest {
            user_uuid: body.user_uuid,
            video_uuid: body.video_uuid,
            video_push_uuid: body.video_push_uuid,
            input_path: body.input_path,
            target_resolution: body.target_resolution,
            target_bitrate: body.target_bitrate,
        })
        .await?;

    Ok(Json(SubmitTranscodeReply {
        task_uuid: job.job_uuid,
        status: "accepted",
    }))
}

async fn get_job_status(
    State(state): State<HttpIngressState>,
    Path(job_uuid): Path<Uuid>,
) -> Result<Json<JobStatusReply>, AppError> {
    let job = state.jobs.get(job_uuid).await.map_err(|e| match e {
        crate::error::JobStoreError::NotFound(id) => AppError::NotFound(id),
        other => AppError::Job(other),
    })?;

    Ok(Json(JobStatusReply {
        job_uuid: job.job_uuid,
        status: format!("{:?}", job.status).to_uppercase(),
        progress: job.progress,
        error_message: job.error_message,
        output_object_key: job.output_object_key,
    }))
}
