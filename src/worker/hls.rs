use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{QueueError, VideoError};
use crate::job_store::HlsJobRepository;
use crate::model::{HlsJob, HlsStatus};
use crate::object_store::{ObjectStore, UploadItem};
use crate::public_url::public_url;
use crate::queue::BoundedQueue;
use crate::reporter::ResultReporter;
use crate::util::ffmpeg_progress::FfmpegProgressTracker;
use crate::video::hwaccel::HwAccel;
use crate::video::master_playlist::{render_master_playlist, RenditionEntry};
use crate::video::HlsVariantCommand;

use super::WorkerStats;

#[derive(Clone)]
pub struct HlsWorkerConfig {
    pub worker_count: usize,
    pub temp_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub hwaccel: HwAccel,
    pub public_storage_base: Option<String>,
}

pub struct HlsWorkerPool {
    pub stats: Arc<WorkerStats>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl HlsWorkerPool {
    /// Spawns the pool and performs the one-time backlog scan described for
    /// the HLS worker pool: any job left PENDING from a prior process
    /// lifetime is re-enqueued before the workers start draining.
    pub async fn spawn(
        config: HlsWorkerConfig,
        hls_jobs: Arc<dyn HlsJobRepository>,
        object_store: Arc<dyn ObjectStore>,
        reporter: Arc<ResultReporter>,
        hls_queue: Arc<BoundedQueue<Uuid>>,
        cancellation: CancellationToken,
    ) -> Self {
        if let Ok(backlog) = hls_jobs.query_by_status(HlsStatus::Pending, 100).await {
            for job in &backlog {
                if let Err(e) = hls_queue.enqueue(job.job_uuid) {
                    warn!(job_uuid = %job.job_uuid, error = %e, "failed to re-enqueue backlog HLS job");
                }
            }
        }

        let stats = Arc::new(WorkerStats::default());
        let mut handles = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = HlsWorker {
                worker_id,
                config: config.clone(),
                hls_jobs: hls_jobs.clone(),
                object_store: object_store.clone(),
                reporter: reporter.clone(),
                hls_queue: hls_queue.clone(),
                stats: stats.clone(),
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

struct HlsWorker {
    worker_id: usize,
    config: HlsWorkerConfig,
    hls_jobs: Arc<dyn HlsJobRepository>,
    object_store: Arc<dyn ObjectStore>,
    reporter: Arc<ResultReporter>,
    hls_queue: Arc<BoundedQueue<Uuid>>,
    stats: Arc<WorkerStats>,
    cancellation: CancellationToken,
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp4") | Some("m4s") => "video/mp4",
        _ => "application/octet-stream",
    }
}

impl HlsWorker {
    async fn run(self) {
        info!(worker_id = self.worker_id, "hls worker started");
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    info!(worker_id = self.worker_id, "hls worker cancelled");
                    break;
                }
                dequeued = self.hls_queue.dequeue() => {
                    match dequeued {
                        Ok(job_uuid) => {
                            self.stats.job_started();
                            let success = self.process(job_uuid).await;
                            self.stats.job_finished(success);
                        }
                        Err(QueueError::Closed) => break,
                        Err(QueueError::Full) => unreachable!("dequeue never returns Full"),
                    }
                }
            }
        }
        info!(worker_id = self.worker_id, "hls worker stopped");
    }

    fn report_task_uuid(job: &HlsJob) -> Uuid {
        job.source_job_uuid
    }

    #[tracing::instrument(skip(self), fields(worker_id = self.worker_id, job_uuid = %job_uuid))]
    async fn process(&self, job_uuid: Uuid) -> bool {
        let job = match self.hls_jobs.get(job_uuid).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to re-read hls job for processing");
                return false;
            }
        };
        if matches!(job.status, HlsStatus::Completed | HlsStatus::Failed) {
            return true;
        }

        if let Err(e) = self
            .hls_jobs
            .update_status(job.job_uuid, HlsStatus::Processing, None, None, 0)
            .await
        {
            error!(error = %e, "failed to transition hls job to PROCESSING");
            return false;
        }

        let local_output_dir = self.config.temp_dir.join(&job.output_dir);
        if let Err(e) = fs::create_dir_all(&local_output_dir).await {
            return self.fail(&job, &format!("failed to create output dir: {e}")).await;
        }

        let local_input = self.config.temp_dir.join("inputs").join(format!("hls_input_{}", job.job_uuid));
        let input_created_here = !local_input.exists();
        if input_created_here {
            if let Some(parent) = local_input.parent() {
                let _ = fs::create_dir_all(parent).await;
            }
            if let Err(e) = self.object_store.download(&job.input_object_key, &local_input).await {
                return self.fail(&job, &format!("failed to fetch input: {e}")).await;
            }
        }

        let variants = &job.hls_config.resolutions;
        let total = variants.len().max(1);
        let mut renditions = Vec::with_capacity(variants.len());

        for (i, variant) in variants.iter().enumerate() {
            let variant_dir = local_output_dir.join(variant.resolution.as_str());
            if let Err(e) = fs::create_dir_all(&variant_dir).await {
                return self.fail(&job, &format!("failed to create variant dir: {e}")).await;
            }

            let command = HlsVariantCommand::new(
                local_input.to_string_lossy().as_ref(),
                variant_dir.clone(),
                variant.resolution,
                variant.bitrate,
                job.hls_config.segment_duration,
                job.hls_config.list_size,
                job.hls_config.format,
                self.config.hwaccel,
            );
            let tracker = FfmpegProgressTracker::new();
            match command.run_with_progress(&self.config.ffmpeg_path, &tracker, &self.cancellation).await {
                Ok(()) => {}
                Err(VideoError::Cancelled) => {
                    info!("hls job cancelled, leaving status for stuck-job recovery");
                    return false;
                }
                Err(e) => {
                    return self
                        .fail(&job, &format!("ffmpeg failed for variant {}: {e}", variant.resolution.as_str()))
                        .await;
                }
            }

            renditions.push(RenditionEntry {
                variant: variant.clone(),
                playlist_url: format!("{}/stream.m3u8", variant.resolution.as_str()),
            });

            let progress = (((i + 1) * 100) / total) as u8;
            let _ = self.hls_jobs.update_progress(job.job_uuid, progress).await;
        }

        let master_playlist = render_master_playlist(&renditions);
        let master_path = local_output_dir.join("master.m3u8");
        if let Err(e) = fs::write(&master_path, master_playlist).await {
            return self.fail(&job, &format!("failed to write master playlist: {e}")).await;
        }

        let mut local_paths = Vec::new();
        if let Err(e) = collect_files(&local_output_dir, &mut local_paths).await {
            return self.fail(&job, &format!("failed to walk output dir: {e}")).await;
        }
        if local_paths.is_empty() {
            return self.fail(&job, "no output files produced").await;
        }

        let object_keys: Vec<String> = local_paths
            .iter()
            .map(|p| {
                let rel = p.strip_prefix(&local_output_dir).unwrap_or(p);
                format!("{}/{}", job.output_dir, rel.to_string_lossy())
            })
            .collect();
        let upload_items: Vec<UploadItem<'_>> = local_paths
            .iter()
            .zip(object_keys.iter())
            .map(|(local_path, object_key)| UploadItem {
                local_path,
                object_key: object_key.clone(),
                content_type: content_type_for(local_path),
            })
            .collect();

        if let Err(e) = self.object_store.upload_many(&upload_items).await {
            return self.fail(&job, &format!("failed to upload hls output: {e}")).await;
        }

        let master_object_key = format!("{}/master.m3u8", job.output_dir);
        let url = public_url(self.config.public_storage_base.as_deref(), &master_object_key);

        if let Err(e) = self
            .hls_jobs
            .update_status(job.job_uuid, HlsStatus::Completed, None, Some(&url), 100)
            .await
        {
            error!(error = %e, "failed to persist COMPLETED hls status");
        }

        self.reporter
            .report_success(job_video_uuid(&job), Self::report_task_uuid(&job), &url)
            .await;

        let _ = fs::remove_dir_all(&local_output_dir).await;
        if input_created_here {
            let _ = fs::remove_file(&local_input).await;
        }

        true
    }

    async fn fail(&self, job: &HlsJob, message: &str) -> bool {
        let truncated = HlsJob::truncate_error(message);
        error!(error = %truncated, "hls job failed");
        if let Err(e) = self
            .hls_jobs
            .update_status(job.job_uuid, HlsStatus::Failed, Some(&truncated), None, 0)
            .await
        {
            error!(error = %e, "failed to persist FAILED hls status");
        }
        self.reporter
            .report_failure(job_video_uuid(job), Self::report_task_uuid(job), &truncated)
            .await;
        false
    }
}

/// The HLS job model doesn't carry a `video_uuid` field directly (it's
/// embedded only in its object-store paths); recover it from `output_dir`,
/// which is always `hls/<user>/<video>/<job>`.
fn job_video_uuid(job: &HlsJob) -> Uuid {
    job.output_dir
        .split('/')
        .nth(2)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or(job.job_uuid)
}

async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bitrate, HlsConfig, HlsSourceType, Resolution};

    #[test]
    fn content_type_maps_known_hls_extensions() {
        assert_eq!(content_type_for(Path::new("master.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for(Path::new("segment0.ts")), "video/mp2t");
        assert_eq!(content_type_for(Path::new("init.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("segment0.m4s")), "video/mp4");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn job_video_uuid_recovers_from_output_dir() {
        let user_uuid = Uuid::new_v4();
        let video_uuid = Uuid::new_v4();
        let hls_config = HlsConfig::single_variant(Resolution::R720p, Bitrate::parse("2000k").unwrap());
        let job = HlsJob::new(
            Uuid::new_v4(),
            HlsSourceType::Transcoded,
            user_uuid,
            video_uuid,
            "transcoded/u/v_720p_2000k.mp4".to_string(),
            hls_config,
        );
        assert_eq!(job_video_uuid(&job), video_uuid);
    }

    #[test]
    fn job_video_uuid_falls_back_to_job_uuid_on_malformed_output_dir() {
        let hls_config = HlsConfig::single_variant(Resolution::R720p, Bitrate::parse("2000k").unwrap());
        let mut job = HlsJob::new(
            Uuid::new_v4(),
            HlsSourceType::Transcoded,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "transcoded/u/v_720p_2000k.mp4".to_string(),
            hls_config,
        );
        job.output_dir = "not-a-path".to_string();
        assert_eq!(job_video_uuid(&job), job.job_uuid);
    }
}
