use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job_store::TranscodeJobRepository;
use crate::model::TranscodeStatus;
use crate::queue::BoundedQueue;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const STUCK_THRESHOLD: chrono::Duration = chrono::Duration::hours(1);

/// Periodically resets PROCESSING jobs that have gone idle (worker crash,
/// process restart with no stuck-job handling in flight) back to PENDING
/// and re-enqueues them.
pub struct RecoverySweeper {
    jobs: Arc<dyn TranscodeJobRepository>,
    transcode_queue: Arc<BoundedQueue<Uuid>>,
}

impl RecoverySweeper {
    pub fn new(jobs: Arc<dyn TranscodeJobRepository>, transcode_queue: Arc<BoundedQueue<Uuid>>) -> Self {
        Self { jobs, transcode_queue }
    }

    pub async fn run(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        info!("stuck-job recovery sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                    self.sweep_once().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("stuck-job recovery sweeper stopped");
    }

    async fn sweep_once(&self) {
        let processing = match self.jobs.query_by_status(TranscodeStatus::Processing, 100).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "recovery sweep failed to query PROCESSING jobs");
                return;
            }
        };

        let now = Utc::now();
        for job in processing {
            if now - job.updated_at < STUCK_THRESHOLD {
                continue;
            }

            let result = self
                .jobs
                .update_status(job.job_uuid, TranscodeStatus::Pending, None, Some(&job.output_object_key), 0)
                .await;
            match result {
                Ok(()) => {
                    if let Err(e) = self.transcode_queue.enqueue(job.job_uuid) {
                        warn!(job_uuid = %job.job_uuid, error = %e, "recovered job failed to re-enqueue");
                    } else {
                        info!(job_uuid = %job.job_uuid, "recovered stuck job, re-enqueued");
                    }
                }
                Err(e) => error!(job_uuid = %job.job_uuid, error = %e, "failed to reset stuck job to PENDING"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::InMemoryJobStore;
    use crate::model::{Bitrate, Resolution, TranscodeJob};

    #[tokio::test]
    async fn sweeps_only_jobs_past_the_stuck_threshold() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(BoundedQueue::new(10));

        let mut stale = TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        );
        stale.status = TranscodeStatus::Processing;
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.create(&stale).await.unwrap();

        let fresh = TranscodeJob::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "uploads/u/v2.mov".to_string(),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
        );
        store.create(&fresh).await.unwrap();
        store
            .update_status(fresh.job_uuid, TranscodeStatus::Processing, None, None, 10)
            .await
            .unwrap();

        let sweeper = RecoverySweeper::new(store.clone(), queue.clone());
        sweeper.sweep_once().await;

        let recovered = store.get(stale.job_uuid).await.unwrap();
        assert_eq!(recovered.status, TranscodeStatus::Pending);
        assert_eq!(queue.try_dequeue().unwrap(), Some(stale.job_uuid));

        let untouched = store.get(fresh.job_uuid).await.unwrap();
        assert_eq!(untouched.status, TranscodeStatus::Processing);
    }
}
