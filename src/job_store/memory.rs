use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{HlsJobRepository, TranscodeJobRepository};
use crate::error::JobStoreError;
use crate::model::{HlsJob, HlsStatus, TranscodeJob, TranscodeStatus};

/// In-memory job store used by unit tests and by local/dev runs without Postgres.
#[derive(Default)]
pub struct InMemoryJobStore {
    transcode: Mutex<HashMap<Uuid, TranscodeJob>>,
    hls: Mutex<HashMap<Uuid, HlsJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscodeJobRepository for InMemoryJobStore {
    async fn create(&self, job: &TranscodeJob) -> Result<(), JobStoreError> {
        let mut guard = self.transcode.lock().unwrap();
        if guard.contains_key(&job.job_uuid) {
            return Err(JobStoreError::DuplicateKey(job.job_uuid));
        }
        guard.insert(job.job_uuid, job.clone());
        Ok(())
    }

    async fn get(&self, job_uuid: Uuid) -> Result<TranscodeJob, JobStoreError> {
        self.transcode
            .lock()
            .unwrap()
            .get(&job_uuid)
            .cloned()
            .ok_or(JobStoreError::NotFound(job_uuid))
    }

    async fn find_active_by_video(&self, video_uuid: Uuid) -> Result<Option<TranscodeJob>, JobStoreError> {
        let guard = self.transcode.lock().unwrap();
        Ok(guard
            .values()
            .find(|j| {
                j.video_uuid == video_uuid
                    && matches!(j.status, TranscodeStatus::Pending | TranscodeStatus::Processing)
            })
            .cloned())
    }

    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: TranscodeStatus,
        error_message: Option<&str>,
        output_object_key: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError> {
        let mut guard = self.transcode.lock().unwrap();
        let job = guard.get_mut(&job_uuid).ok_or(JobStoreError::NotFound(job_uuid))?;
        job.status = status;
        job.error_message = error_message.map(|s| s.to_string());
        if let Some(key) = output_object_key {
            job.output_object_key = key.to_string();
        }
        job.progress = progress;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError> {
        let mut guard = self.transcode.lock().unwrap();
        let job = guard.get_mut(&job_uuid).ok_or(JobStoreError::NotFound(job_uuid))?;
        job.progress = progress;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn query_by_status(&self, status: TranscodeStatus, limit: i64) -> Result<Vec<TranscodeJob>, JobStoreError> {
        let guard = self.transcode.lock().unwrap();
        let mut jobs: Vec<_> = guard.values().filter(|j| j.status == status).cloned().collect();
        jobs.sort_by_key(|j| j.updated_at);
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[async_trait]
impl HlsJobRepository for InMemoryJobStore {
    async fn create(&self, job: &HlsJob) -> Result<(), JobStoreError> {
        let mut guard = self.hls.lock().unwrap();
        if guard.contains_key(&job.job_uuid) {
            return Err(JobStoreError::DuplicateKey(job.job_uuid));
        }
        guard.insert(job.job_uuid, job.clone());
        Ok(())
    }

    async fn get(&self, job_uuid: Uuid) -> Result<HlsJob, JobStoreError> {
        self.hls
            .lock()
            .unwrap()
            .get(&job_uuid)
            .cloned()
            .ok_or(JobStoreError::NotFound(job_uuid))
    }

    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: HlsStatus,
        error_message: Option<&str>,
        master_playlist_url: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError> {
        let mut guard = self.hls.lock().unwrap();
        let job = guard.get_mut(&job_uuid).ok_or(JobStoreError::NotFound(job_uuid))?;
        job.status = status;
        job.error_message = error_message.map(|s| s.to_string());
        if let Some(url) = master_playlist_url {
            job.master_playlist_url = Some(url.to_string());
        }
        job.progress = progress;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError> {
        let mut guard = self.hls.lock().unwrap();
        let job = guard.get_mut(&job_uuid).ok_or(JobStoreError::NotFound(job_uuid))?;
        job.progress = progress;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn query_by_status(&self, status: HlsStatus, limit: i64) -> Result<Vec<HlsJob>, JobStoreError> {
        let guard = self.hls.lock().unwrap();
        let mut jobs: Vec<_> = guard.values().filter(|j| j.status == status).cloned().collect();
        jobs.sort_by_key(|j| j.updated_at);
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bitrate, Resolution};

    fn sample_job() -> TranscodeJob {
        TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.create(&job).await.unwrap();
        let fetched = store.get(job.job_uuid).await.unwrap();
        assert_eq!(fetched.job_uuid, job.job_uuid);
        assert_eq!(fetched.status, TranscodeStatus::Pending);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_key() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.create(&job).await.unwrap();
        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, JobStoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn find_active_by_video_ignores_terminal_jobs() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        store.create(&job).await.unwrap();
        store
            .update_status(job.job_uuid, TranscodeStatus::Completed, None, Some("out.mp4"), 100)
            .await
            .unwrap();
        assert!(store.find_active_by_video(job.video_uuid).await.unwrap().is_none());
    }
}
