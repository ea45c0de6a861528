mod hls;
mod transcode;

pub use hls::{HlsWorkerConfig, HlsWorkerPool};
pub use transcode::{TranscodeWorkerConfig, TranscodeWorkerPool};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Shared per-pool counters exposed for observability.
#[derive(Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub successful: AtomicU64,
    pub failed: AtomicU64,
    pub currently_running: AtomicU64,
}

impl WorkerStats {
    pub fn job_started(&self) {
        self.currently_running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self, success: bool) {
        self.currently_running.fetch_sub(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Enforces the strict "at most once per 60s per job" persisted-progress
/// throttle shared by every worker in a pool.
#[derive(Default)]
pub struct ProgressThrottle {
    last_persisted: Mutex<HashMap<Uuid, Instant>>,
}

impl ProgressThrottle {
    const MIN_INTERVAL: Duration = Duration::from_secs(60);

    pub fn should_persist(&self, job_uuid: Uuid) -> bool {
        let mut map = self.last_persisted.lock().expect("progress throttle mutex poisoned");
        match map.get(&job_uuid) {
            Some(last) if last.elapsed() < Self::MIN_INTERVAL => false,
            _ => {
                map.insert(job_uuid, Instant::now());
                true
            }
        }
    }

    pub fn clear(&self, job_uuid: Uuid) {
        self.last_persisted.lock().expect("progress throttle mutex poisoned").remove(&job_uuid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_throttle_allows_first_update_then_blocks() {
        let throttle = ProgressThrottle::default();
        let job = Uuid::new_v4();
        assert!(throttle.should_persist(job));
        assert!(!throttle.should_persist(job));
        throttle.clear(job);
        assert!(throttle.should_persist(job));
    }

    #[test]
    fn worker_stats_tracks_success_and_failure() {
        let stats = WorkerStats::default();
        stats.job_started();
        stats.job_finished(true);
        stats.job_started();
        stats.job_finished(false);
        assert_eq!(stats.processed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.successful.load(Ordering::Relaxed), 1);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.currently_running.load(Ordering::Relaxed), 0);
    }
}
