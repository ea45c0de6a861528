use std::sync::Arc;

use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::AppError;
use crate::job_store::TranscodeJobRepository;
use crate::model::TranscodeStatus;

use super::admission::{AdmissionRequest, AdmissionService};

pub mod proto {
    tonic::include_proto!("transcode.ingress.v1");
}

use proto::transcode_ingress_server::{TranscodeIngress, TranscodeIngressServer};
use proto::{
    GetJobStatusRequest, GetJobStatusResponse, SubmitTranscodeRequest, SubmitTranscodeResponse,
};

pub struct TranscodeIngressService {
    admission: Arc<AdmissionService>,
    jobs: Arc<dyn TranscodeJobRepository>,
}

impl TranscodeIngressService {
    pub fn new(admission: Arc<AdmissionService>, jobs: Arc<dyn TranscodeJobRepository>) -> Self {
        Self { admission, jobs }
    }

    pub fn into_server(self) -> TranscodeIngressServer<Self> {
        TranscodeIngressServer::new(self)
    }
}

fn app_error_to_status(err: AppError) -> Status {
    match err {
        AppError::InvalidParam(msg) => Status::invalid_argument(msg),
        AppError::NotFound(id) => Status::not_found(format!("job not found: {id}")),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl TranscodeIngress for TranscodeIngressService {
    async fn submit_transcode(
        &self,
        request: Request<SubmitTranscodeRequest>,
    ) -> Result<Response<SubmitTranscodeResponse>, Status> {
        let req = request.into_inner();
        let user_uuid = Uuid::parse_str(&req.user_uuid)
            .map_err(|e| Status::invalid_argument(format!("invalid user_uuid: {e}")))?;
        let video_uuid = Uuid::parse_str(&req.video_uuid)
            .map_err(|e| Status::invalid_argument(format!("invalid video_uuid: {e}")))?;
        let video_push_uuid = req
            .video_push_uuid
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| Status::invalid_argument(format!("invalid video_push_uuid: {e}")))?;

        let admitted = self
            .admission
            .admit(AdmissionRequest {
                user_uuid,
                video_uuid,
                video_push_uuid,
                input_path: req.input_path,
                target_resolution: req.target_resolution,
                target_bitrate: req.target_bitrate,
            })
            .await;

        match admitted {
            Ok(job) => Ok(Response::new(SubmitTranscodeResponse {
                task_uuid: job.job_uuid.to_string(),
                success: true,
                message: "accepted".to_string(),
            })),
            Err(AppError::InvalidParam(msg)) => Ok(Response::new(SubmitTranscodeResponse {
                task_uuid: String::new(),
                success: false,
                message: msg,
            })),
            Err(e) => Err(app_error_to_status(e)),
        }
    }

    async fn get_job_status(
        &self,
        request: Request<GetJobStatusRequest>,
    ) -> Result<Response<GetJobStatusResponse>, Status> {
        let req = request.into_inner();
        let job_uuid = Uuid::parse_str(&req.job_uuid)
            .map_err(|e| Status::invalid_argument(format!("invalid job_uuid: {e}")))?;
        let job = self
            .jobs
            .get(job_uuid)
            .await
            .map_err(|e| match e {
                crate::error::JobStoreError::NotFound(id) => Status::not_found(format!("job not found: {id}")),
                other => Status::internal(other.to_string()),
            })?;

        let status_str = match job.status {
            TranscodeStatus::Pending => "PENDING",
            TranscodeStatus::Processing => "PROCESSING",
            TranscodeStatus::Completed => "COMPLETED",
            TranscodeStatus::Failed => "FAILED",
            TranscodeStatus::Cancelled => "CANCELLED",
        };

        Ok(Response::new(GetJobStatusResponse {
            job_uuid: job.job_uuid.to_string(),
            status: status_str.to_string(),
            progress: job.progress as u32,
            error_message: job.error_message.unwrap_or_default(),
            output_object_key: job.output_object_key,
        }))
    }
}
