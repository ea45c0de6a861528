use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{JobStoreError, QueueError, VideoError};
use crate::job_store::{HlsJobRepository, TranscodeJobRepository};
use crate::model::{truncate_error_message, HlsConfig, HlsJob, HlsSourceType, TranscodeStatus};
use crate::object_store::ObjectStore;
use crate::queue::BoundedQueue;
use crate::util::ffmpeg_progress::FfmpegProgressTracker;
use crate::video::hwaccel::HwAccel;
use crate::video::Mp4TranscodeCommand;
use crate::video::VideoMetadata;

use super::{ProgressThrottle, WorkerStats};

#[derive(Clone)]
pub struct TranscodeWorkerConfig {
    pub worker_count: usize,
    pub temp_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub hwaccel: HwAccel,
}

/// Pool of `worker_count` workers sharing one transcode queue, each running
/// the dequeue-then-process loop described for the transcode pipeline.
pub struct TranscodeWorkerPool {
    pub stats: Arc<WorkerStats>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TranscodeWorkerPool {
    pub fn spawn(
        config: TranscodeWorkerConfig,
        jobs: Arc<dyn TranscodeJobRepository>,
        hls_jobs: Arc<dyn HlsJobRepository>,
        object_store: Arc<dyn ObjectStore>,
        transcode_queue: Arc<BoundedQueue<Uuid>>,
        hls_queue: Arc<BoundedQueue<Uuid>>,
        cancellation: CancellationToken,
    ) -> Self {
        let stats = Arc::new(WorkerStats::default());
        let progress_throttle = Arc::new(ProgressThrottle::default());

        let mut handles = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = TranscodeWorker {
                worker_id,
                config: config.clone(),
                jobs: jobs.clone(),
                hls_jobs: hls_jobs.clone(),
                object_store: object_store.clone(),
                transcode_queue: transcode_queue.clone(),
                hls_queue: hls_queue.clone(),
                stats: stats.clone(),
                progress_throttle: progress_throttle.clone(),
                cancellation: cancellation.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        Self { stats, handles }
    }

    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

struct TranscodeWorker {
    worker_id: usize,
    config: TranscodeWorkerConfig,
    jobs: Arc<dyn TranscodeJobRepository>,
    hls_jobs: Arc<dyn HlsJobRepository>,
    object_store: Arc<dyn ObjectStore>,
    transcode_queue: Arc<BoundedQueue<Uuid>>,
    hls_queue: Arc<BoundedQueue<Uuid>>,
    stats: Arc<WorkerStats>,
    progress_throttle: Arc<ProgressThrottle>,
    cancellation: CancellationToken,
}

impl TranscodeWorker {
    async fn run(self) {
        info!(worker_id = self.worker_id, "transcode worker started");
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    info!(worker_id = self.worker_id, "transcode worker cancelled");
                    break;
                }
                dequeued = self.transcode_queue.dequeue() => {
                    match dequeued {
                        Ok(job_uuid) => {
                            self.stats.job_started();
                            let success = self.process(job_uuid).await;
                            self.stats.job_finished(success);
                            self.progress_throttle.clear(job_uuid);
                        }
                        Err(QueueError::Closed) => break,
                        Err(QueueError::Full) => unreachable!("dequeue never returns Full"),
                    }
                }
            }
        }
        info!(worker_id = self.worker_id, "transcode worker stopped");
    }

    #[tracing::instrument(skip(self), fields(worker_id = self.worker_id, job_uuid = %job_uuid))]
    async fn process(&self, job_uuid: Uuid) -> bool {
        // Stage A: admission check against possibly-stale in-memory state.
        let job = match self.jobs.get(job_uuid).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to re-read job for processing");
                return false;
            }
        };
        if matches!(
            job.status,
            TranscodeStatus::Completed | TranscodeStatus::Failed | TranscodeStatus::Cancelled
        ) {
            info!(status = ?job.status, "job already terminal, skipping");
            return true;
        }

        // Stage B: preamble.
        if let Err(e) = self
            .jobs
            .update_status(job.job_uuid, TranscodeStatus::Processing, None, None, 0)
            .await
        {
            error!(error = %e, "failed to transition job to PROCESSING");
            return false;
        }

        let inputs_dir = self.config.temp_dir.join("inputs");
        if let Err(e) = fs::create_dir_all(&inputs_dir).await {
            return self.fail(job.job_uuid, &format!("failed to create temp dir: {e}")).await;
        }
        let basename = job
            .input_object_key
            .rsplit('/')
            .next()
            .unwrap_or(&job.input_object_key);
        let local_input = inputs_dir.join(format!("input_{}_{}", job.job_uuid, basename));
        let local_output = self.config.temp_dir.join(&job.output_object_key);
        if let Some(parent) = local_output.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return self.fail(job.job_uuid, &format!("failed to create output dir: {e}")).await;
            }
        }

        // Stage C: fetch input.
        if let Err(e) = self.object_store.download(&job.input_object_key, &local_input).await {
            let _ = fs::remove_file(&local_input).await;
            return self.fail(job.job_uuid, &format!("failed to fetch input: {e}")).await;
        }

        // Stage D: duration probe (best-effort; the progress scanner degrades
        // to never persisting an update if unavailable).
        let duration_secs = VideoMetadata::extract(local_input.to_string_lossy().as_ref(), &self.config.ffprobe_path)
            .await
            .ok()
            .and_then(|m| m.duration_secs())
            .unwrap_or(0.0);

        // Stage E/F: build and run the FFmpeg command, scanning its live
        // progress output against the probed duration while it runs.
        let command = Mp4TranscodeCommand::new(
            local_input.to_string_lossy().as_ref(),
            local_output.clone(),
            job.resolution,
            job.bitrate,
            self.config.hwaccel,
        );
        let tracker = FfmpegProgressTracker::new();
        let progress_poller = self.spawn_progress_poller(job.job_uuid, duration_secs, &tracker);
        let run_result = command.run_with_progress(&self.config.ffmpeg_path, &tracker, &self.cancellation).await;
        progress_poller.abort();
        let _ = fs::remove_file(&local_input).await;

        if let Err(VideoError::Cancelled) = run_result {
            info!("transcode job cancelled, leaving status for stuck-job recovery");
            return false;
        }
        if let Err(e) = run_result {
            return self.fail(job.job_uuid, &format!("ffmpeg failed: {e}")).await;
        }

        // Stage G: upload.
        let upload_result = self
            .object_store
            .upload(&local_output, &job.output_object_key, "video/mp4")
            .await;
        let _ = fs::remove_file(&local_output).await;

        if let Err(e) = upload_result {
            return self.fail(job.job_uuid, &format!("failed to upload output: {e}")).await;
        }

        if let Err(e) = self
            .jobs
            .update_status(job.job_uuid, TranscodeStatus::Completed, None, Some(&job.output_object_key), 100)
            .await
        {
            error!(error = %e, "failed to persist COMPLETED status");
            return false;
        }

        // Stage H: derive an HLS job. Failure here does not fail the
        // transcode job, which stays COMPLETED.
        self.derive_hls_job(&job).await;

        true
    }

    /// Spawns a task that, every second, computes `floor(sec/duration*100)`
    /// clamped to `[0, 99]` from `tracker`'s live progress and persists it
    /// through the 60s-per-job throttle. A `duration_secs` of zero (probe
    /// failed) disables persistence entirely rather than dividing by zero.
    fn spawn_progress_poller(
        &self,
        job_uuid: Uuid,
        duration_secs: f64,
        tracker: &FfmpegProgressTracker,
    ) -> tokio::task::JoinHandle<()> {
        let progress_ms = tracker.progress_ms.clone();
        let jobs = self.jobs.clone();
        let throttle = self.progress_throttle.clone();
        tokio::spawn(async move {
            if duration_secs <= 0.0 {
                return;
            }
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let sec = progress_ms.load(Ordering::Relaxed) as f64 / 1000.0;
                let pct = ((sec / duration_secs) * 100.0).floor().clamp(0.0, 99.0) as u8;
                if throttle.should_persist(job_uuid) {
                    let _ = jobs.update_progress(job_uuid, pct).await;
                }
            }
        })
    }

    async fn derive_hls_job(&self, job: &crate::model::TranscodeJob) {
        let hls_config = HlsConfig::single_variant(job.resolution, job.bitrate);
        let hls_job = HlsJob::new(
            job.job_uuid,
            HlsSourceType::Transcoded,
            job.user_uuid,
            job.video_uuid,
            job.output_object_key.clone(),
            hls_config,
        );

        if let Err(e) = self.hls_jobs.create(&hls_job).await {
            if !matches!(e, JobStoreError::DuplicateKey(_)) {
                warn!(error = %e, "failed to derive HLS job, transcode job remains COMPLETED");
            }
            return;
        }

        if let Err(e) = self.hls_queue.enqueue(hls_job.job_uuid) {
            warn!(error = %e, "failed to enqueue derived HLS job");
        }
    }

    async fn fail(&self, job_uuid: Uuid, message: &str) -> bool {
        let truncated = truncate_error_message(message);
        error!(error = %truncated, "transcode job failed");
        if let Err(e) = self
            .jobs
            .update_status(job_uuid, TranscodeStatus::Failed, Some(&truncated), None, 0)
            .await
        {
            error!(error = %e, "failed to persist FAILED status");
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::job_store::InMemoryJobStore;
    use crate::model::{Bitrate, Resolution, TranscodeJob};
    use async_trait::async_trait;
    use std::path::Path;

    struct UnusedObjectStore;

    #[async_trait]
    impl ObjectStore for UnusedObjectStore {
        async fn upload(&self, _: &Path, _: &str, _: &str) -> Result<String, StorageError> {
            unreachable!("not exercised by these tests")
        }
        async fn download(&self, _: &str, _: &Path) -> Result<(), StorageError> {
            unreachable!("not exercised by these tests")
        }
    }

    fn worker(jobs: Arc<dyn TranscodeJobRepository>, hls_jobs: Arc<dyn HlsJobRepository>) -> TranscodeWorker {
        TranscodeWorker {
            worker_id: 0,
            config: TranscodeWorkerConfig {
                worker_count: 1,
                temp_dir: PathBuf::from("/tmp/transcode-worker-test"),
                ffmpeg_path: PathBuf::from("ffmpeg"),
                ffprobe_path: PathBuf::from("ffprobe"),
                hwaccel: HwAccel::Software,
            },
            jobs,
            hls_jobs,
            object_store: Arc::new(UnusedObjectStore),
            transcode_queue: Arc::new(BoundedQueue::new(10)),
            hls_queue: Arc::new(BoundedQueue::new(10)),
            stats: Arc::new(WorkerStats::default()),
            progress_throttle: Arc::new(ProgressThrottle::default()),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn fail_truncates_long_error_messages_before_persisting() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let job = TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        );
        jobs.create(&job).await.unwrap();

        let worker = worker(jobs.clone(), Arc::new(InMemoryJobStore::new()));
        let long_message = "x".repeat(600);
        assert!(!worker.fail(job.job_uuid, &long_message).await);

        let failed = jobs.get(job.job_uuid).await.unwrap();
        assert_eq!(failed.status, TranscodeStatus::Failed);
        assert_eq!(failed.error_message.unwrap().chars().count(), crate::model::ERROR_MESSAGE_MAX_LEN);
    }

    #[tokio::test]
    async fn derive_hls_job_enqueues_a_pending_hls_job() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let hls_jobs = Arc::new(InMemoryJobStore::new());
        let mut job = TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        );
        job.output_object_key = "transcoded/u/v_720p_2000k.mp4".to_string();
        jobs.create(&job).await.unwrap();

        let worker = worker(jobs.clone(), hls_jobs.clone());
        worker.derive_hls_job(&job).await;

        let queued = worker.hls_queue.try_dequeue().unwrap().expect("hls job enqueued");
        let hls_job = hls_jobs.get(queued).await.unwrap();
        assert_eq!(hls_job.source_job_uuid, job.job_uuid);
        assert_eq!(hls_job.input_object_key, job.output_object_key);
    }

    #[tokio::test]
    async fn deriving_hls_job_twice_is_not_fatal() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let hls_jobs = Arc::new(InMemoryJobStore::new());
        let job = TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        );
        jobs.create(&job).await.unwrap();

        let worker = worker(jobs.clone(), hls_jobs.clone());
        worker.derive_hls_job(&job).await;
        worker.derive_hls_job(&job).await;
    }
}
