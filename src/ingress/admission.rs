use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::job_store::TranscodeJobRepository;
use crate::model::{Bitrate, Resolution, TranscodeJob, TranscodeStatus};
use crate::queue::BoundedQueue;

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub user_uuid: Uuid,
    pub video_uuid: Uuid,
    pub video_push_uuid: Option<Uuid>,
    pub input_path: String,
    pub target_resolution: String,
    pub target_bitrate: String,
}

/// Implements the validate -> idempotency-check -> persist -> enqueue
/// admission algorithm shared by the HTTP surface, the gRPC surface, and the
/// topic consumer.
pub struct AdmissionService {
    jobs: Arc<dyn TranscodeJobRepository>,
    transcode_queue: Arc<BoundedQueue<Uuid>>,
}

impl AdmissionService {
    pub fn new(jobs: Arc<dyn TranscodeJobRepository>, transcode_queue: Arc<BoundedQueue<Uuid>>) -> Self {
        Self { jobs, transcode_queue }
    }

    #[tracing::instrument(skip(self, request), fields(video_uuid = %request.video_uuid))]
    pub async fn admit(&self, request: AdmissionRequest) -> Result<TranscodeJob, AppError> {
        if request.input_path.trim().is_empty() {
            return Err(AppError::InvalidParam("input_path must not be empty".to_string()));
        }
        let resolution = Resolution::parse(&request.target_resolution)
            .ok_or_else(|| AppError::InvalidParam(format!("invalid resolution: {}", request.target_resolution)))?;
        let bitrate = Bitrate::parse(&request.target_bitrate)
            .ok_or_else(|| AppError::InvalidParam(format!("invalid bitrate: {}", request.target_bitrate)))?;

        if let Some(existing) = self.jobs.find_active_by_video(request.video_uuid).await? {
            info!(job_uuid = %existing.job_uuid, "admission is idempotent, returning existing job");
            return Ok(existing);
        }

        let job = TranscodeJob::new(
            request.user_uuid,
            request.video_uuid,
            request.video_push_uuid,
            request.input_path,
            resolution,
            bitrate,
        );
        self.jobs.create(&job).await?;

        if let Err(e) = self.transcode_queue.enqueue(job.job_uuid) {
            warn!(job_uuid = %job.job_uuid, error = %e, "enqueue task failed");
            self.jobs
                .update_status(job.job_uuid, TranscodeStatus::Failed, Some("enqueue task failed"), None, 0)
                .await?;
            return Err(AppError::Queue(e));
        }

        info!(job_uuid = %job.job_uuid, "admitted transcode job");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::InMemoryJobStore;

    fn request() -> AdmissionRequest {
        AdmissionRequest {
            user_uuid: Uuid::new_v4(),
            video_uuid: Uuid::new_v4(),
            video_push_uuid: None,
            input_path: "uploads/u1/v1.mov".to_string(),
            target_resolution: "720p".to_string(),
            target_bitrate: "2000k".to_string(),
        }
    }

    #[tokio::test]
    async fn admits_a_valid_request() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(BoundedQueue::new(10));
        let service = AdmissionService::new(jobs, queue);
        let job = service.admit(request()).await.unwrap();
        assert_eq!(job.status, TranscodeStatus::Pending);
    }

    #[tokio::test]
    async fn repeated_admission_is_idempotent() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(BoundedQueue::new(10));
        let service = AdmissionService::new(jobs, queue);
        let req = request();
        let first = service.admit(req.clone()).await.unwrap();
        let second = service.admit(req).await.unwrap();
        assert_eq!(first.job_uuid, second.job_uuid);
    }

    #[tokio::test]
    async fn rejects_invalid_resolution() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(BoundedQueue::new(10));
        let service = AdmissionService::new(jobs, queue);
        let mut req = request();
        req.target_resolution = "8k".to_string();
        assert!(matches!(service.admit(req).await, Err(AppError::InvalidParam(_))));
    }

    #[tokio::test]
    async fn queue_full_marks_job_failed() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(BoundedQueue::new(0));
        let service = AdmissionService::new(jobs.clone(), queue);
        let err = service.admit(request()).await;
        assert!(err.is_err());
    }
}
