use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tracing::warn;
use uuid::Uuid;

use crate::discovery::ServiceDiscovery;
use crate::error::ReporterError;

pub mod proto {
    tonic::include_proto!("transcode.videoupdate.v1");
}

use proto::video_update_client::VideoUpdateClient;
use proto::UpdateRequest;

const PUBLISHED_STATUS: &str = "published";
const FAILED_STATUS: &str = "failed";

/// Connects to a single logical destination (upload-service or
/// video-service) by resolving its endpoint through service discovery on
/// every call, so a destination that moves or restarts is picked up
/// without restarting the transcode service.
struct Destination {
    logical_name: &'static str,
    timeout: Duration,
    retry_on_transport_error: bool,
}

pub struct ResultReporter {
    discovery: std::sync::Arc<dyn ServiceDiscovery>,
    upload_service: Destination,
    video_service: Destination,
}

impl ResultReporter {
    pub fn new(discovery: std::sync::Arc<dyn ServiceDiscovery>, timeout: Duration) -> Self {
        Self {
            discovery,
            upload_service: Destination {
                logical_name: "upload-service",
                timeout,
                retry_on_transport_error: false,
            },
            video_service: Destination {
                logical_name: "video-service",
                timeout,
                retry_on_transport_error: true,
            },
        }
    }

    pub async fn report_success(&self, video_uuid: Uuid, task_uuid: Uuid, public_url: &str) {
        self.report(video_uuid, task_uuid, PUBLISHED_STATUS, public_url, "").await;
    }

    pub async fn report_failure(&self, video_uuid: Uuid, task_uuid: Uuid, error_message: &str) {
        let message = if error_message.trim().is_empty() {
            "transcode failed"
        } else {
            error_message
        };
        self.report(video_uuid, task_uuid, FAILED_STATUS, "", message).await;
    }

    async fn report(&self, video_uuid: Uuid, task_uuid: Uuid, status: &str, public_url: &str, error_message: &str) {
        let request = UpdateRequest {
            video_uuid: video_uuid.to_string(),
            task_uuid: task_uuid.to_string(),
            status: status.to_string(),
            public_url: public_url.to_string(),
            error_message: error_message.to_string(),
            duration_sec: 0,
            size_bytes: 0,
        };

        for destination in [&self.upload_service, &self.video_service] {
            if let Err(e) = self.call(destination, request.clone()).await {
                warn!(destination = destination.logical_name, error = %e, "result reporter call failed");
            }
        }
    }

    async fn call(&self, destination: &Destination, request: UpdateRequest) -> Result<(), ReporterError> {
        match self.try_call(destination, request.clone()).await {
            Ok(()) => Ok(()),
            Err(ReporterError::Transport { .. }) if destination.retry_on_transport_error => {
                warn!(destination = destination.logical_name, "transport error, retrying once after reconnect");
                self.try_call(destination, request).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_call(&self, destination: &Destination, request: UpdateRequest) -> Result<(), ReporterError> {
        let endpoint = self.discovery.resolve(destination.logical_name).await?;
        let channel = Endpoint::from_shared(endpoint.url)
            .map_err(|e| ReporterError::Transport {
                service: destination.logical_name,
                source: e,
            })?
            .connect_timeout(destination.timeout)
            .timeout(destination.timeout)
            .connect()
            .await
            .map_err(|e| ReporterError::Transport {
                service: destination.logical_name,
                source: e,
            })?;

        let mut client = VideoUpdateClient::new(channel as Channel);
        client
            .update(request)
            .await
            .map_err(|e| ReporterError::Rpc {
                service: destination.logical_name,
                source: e,
            })?;
        Ok(())
    }
}
