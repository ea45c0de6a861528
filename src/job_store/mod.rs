mod memory;
mod postgres;

pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::JobStoreError;
use crate::model::{HlsJob, HlsStatus, TranscodeJob, TranscodeStatus};

/// Durable record of transcode jobs. Implementations provide read-committed,
/// single-row atomic writes; no multi-row transactions are required by callers.
#[async_trait]
pub trait TranscodeJobRepository: Send + Sync {
    async fn create(&self, job: &TranscodeJob) -> Result<(), JobStoreError>;
    async fn get(&self, job_uuid: Uuid) -> Result<TranscodeJob, JobStoreError>;
    async fn find_active_by_video(&self, video_uuid: Uuid) -> Result<Option<TranscodeJob>, JobStoreError>;
    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: TranscodeStatus,
        error_message: Option<&str>,
        output_object_key: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError>;
    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError>;
    async fn query_by_status(&self, status: TranscodeStatus, limit: i64) -> Result<Vec<TranscodeJob>, JobStoreError>;
}

#[async_trait]
pub trait HlsJobRepository: Send + Sync {
    async fn create(&self, job: &HlsJob) -> Result<(), JobStoreError>;
    async fn get(&self, job_uuid: Uuid) -> Result<HlsJob, JobStoreError>;
    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: HlsStatus,
        error_message: Option<&str>,
        master_playlist_url: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError>;
    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError>;
    async fn query_by_status(&self, status: HlsStatus, limit: i64) -> Result<Vec<HlsJob>, JobStoreError>;
}
