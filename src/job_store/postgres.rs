use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{HlsJobRepository, TranscodeJobRepository};
use crate::error::JobStoreError;
use crate::model::{
    Bitrate, HlsConfig, HlsJob, HlsSegmentFormat, HlsSourceType, HlsStatus, HlsVariant, Resolution, TranscodeJob,
    TranscodeStatus,
};

/// `sqlx`-backed repository implementation over the `transcode_jobs` / `hls_jobs` tables.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, JobStoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| JobStoreError::Database(e.to_string()))
    }
}

fn status_str(status: TranscodeStatus) -> &'static str {
    match status {
        TranscodeStatus::Pending => "PENDING",
        TranscodeStatus::Processing => "PROCESSING",
        TranscodeStatus::Completed => "COMPLETED",
        TranscodeStatus::Failed => "FAILED",
        TranscodeStatus::Cancelled => "CANCELLED",
    }
}

fn parse_status(s: &str) -> TranscodeStatus {
    match s {
        "PROCESSING" => TranscodeStatus::Processing,
        "COMPLETED" => TranscodeStatus::Completed,
        "FAILED" => TranscodeStatus::Failed,
        "CANCELLED" => TranscodeStatus::Cancelled,
        _ => TranscodeStatus::Pending,
    }
}

fn hls_status_str(status: HlsStatus) -> &'static str {
    match status {
        HlsStatus::Pending => "PENDING",
        HlsStatus::Processing => "PROCESSING",
        HlsStatus::Completed => "COMPLETED",
        HlsStatus::Failed => "FAILED",
    }
}

fn parse_hls_status(s: &str) -> HlsStatus {
    match s {
        "PROCESSING" => HlsStatus::Processing,
        "COMPLETED" => HlsStatus::Completed,
        "FAILED" => HlsStatus::Failed,
        _ => HlsStatus::Pending,
    }
}

#[derive(sqlx::FromRow)]
struct TranscodeRow {
    job_uuid: Uuid,
    user_uuid: Uuid,
    video_uuid: Uuid,
    video_push_uuid: Option<Uuid>,
    input_object_key: String,
    resolution: String,
    bitrate_bps: i64,
    output_object_key: String,
    status: String,
    progress: i16,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TranscodeRow {
    fn into_job(self) -> TranscodeJob {
        TranscodeJob {
            job_uuid: self.job_uuid,
            user_uuid: self.user_uuid,
            video_uuid: self.video_uuid,
            video_push_uuid: self.video_push_uuid,
            input_object_key: self.input_object_key,
            resolution: Resolution::parse(&self.resolution).unwrap_or(Resolution::R720p),
            bitrate: Bitrate::parse(&format!("{}", self.bitrate_bps)).expect("bps round-trips"),
            output_object_key: self.output_object_key,
            status: parse_status(&self.status),
            progress: self.progress.max(0) as u8,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
impl TranscodeJobRepository for PostgresJobStore {
    async fn create(&self, job: &TranscodeJob) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transcode_jobs
                (job_uuid, user_uuid, video_uuid, video_push_uuid, input_object_key,
                 resolution, bitrate_bps, output_object_key, status, progress)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.job_uuid)
        .bind(job.user_uuid)
        .bind(job.video_uuid)
        .bind(job.video_push_uuid)
        .bind(&job.input_object_key)
        .bind(job.resolution.as_str())
        .bind(job.bitrate.bps() as i64)
        .bind(&job.output_object_key)
        .bind(status_str(job.status))
        .bind(job.progress as i16)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(JobStoreError::DuplicateKey(job.job_uuid)),
            Err(e) => Err(JobStoreError::Database(e.to_string())),
        }
    }

    async fn get(&self, job_uuid: Uuid) -> Result<TranscodeJob, JobStoreError> {
        let row: Option<TranscodeRow> = sqlx::query_as(
            r#"SELECT job_uuid, user_uuid, video_uuid, video_push_uuid, input_object_key,
                      resolution, bitrate_bps, output_object_key, status, progress,
                      error_message, created_at, updated_at
               FROM transcode_jobs WHERE job_uuid = $1"#,
        )
        .bind(job_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        row.map(TranscodeRow::into_job).ok_or(JobStoreError::NotFound(job_uuid))
    }

    async fn find_active_by_video(&self, video_uuid: Uuid) -> Result<Option<TranscodeJob>, JobStoreError> {
        let row: Option<TranscodeRow> = sqlx::query_as(
            r#"SELECT job_uuid, user_uuid, video_uuid, video_push_uuid, input_object_key,
                      resolution, bitrate_bps, output_object_key, status, progress,
                      error_message, created_at, updated_at
               FROM transcode_jobs
               WHERE video_uuid = $1 AND status IN ('PENDING', 'PROCESSING')
               ORDER BY created_at ASC LIMIT 1"#,
        )
        .bind(video_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(row.map(TranscodeRow::into_job))
    }

    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: TranscodeStatus,
        error_message: Option<&str>,
        output_object_key: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET status = $2,
                error_message = $3,
                output_object_key = COALESCE($4, output_object_key),
                progress = $5,
                updated_at = now()
            WHERE job_uuid = $1
            "#,
        )
        .bind(job_uuid)
        .bind(status_str(status))
        .bind(error_message)
        .bind(output_object_key)
        .bind(progress as i16)
        .execute(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_uuid));
        }
        Ok(())
    }

    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError> {
        let result = sqlx::query("UPDATE transcode_jobs SET progress = $2, updated_at = now() WHERE job_uuid = $1")
            .bind(job_uuid)
            .bind(progress as i16)
            .execute(&self.pool)
            .await
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_uuid));
        }
        Ok(())
    }

    async fn query_by_status(&self, status: TranscodeStatus, limit: i64) -> Result<Vec<TranscodeJob>, JobStoreError> {
        let rows: Vec<TranscodeRow> = sqlx::query_as(
            r#"SELECT job_uuid, user_uuid, video_uuid, video_push_uuid, input_object_key,
                      resolution, bitrate_bps, output_object_key, status, progress,
                      error_message, created_at, updated_at
               FROM transcode_jobs WHERE status = $1 ORDER BY updated_at ASC LIMIT $2"#,
        )
        .bind(status_str(status))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(TranscodeRow::into_job).collect())
    }
}

#[derive(sqlx::FromRow)]
struct HlsRow {
    job_uuid: Uuid,
    source_job_uuid: Uuid,
    source_type: String,
    input_object_key: String,
    resolutions_json: serde_json::Value,
    segment_duration: i32,
    list_size: i32,
    format: String,
    output_dir: String,
    master_playlist_url: Option<String>,
    status: String,
    progress: i16,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl HlsRow {
    fn into_job(self) -> HlsJob {
        let resolutions: Vec<(String, i64)> = serde_json::from_value(self.resolutions_json).unwrap_or_default();
        let resolutions = resolutions
            .into_iter()
            .filter_map(|(res, bps)| {
                Some(HlsVariant {
                    resolution: Resolution::parse(&res)?,
                    bitrate: Bitrate::parse(&bps.to_string())?,
                })
            })
            .collect();

        HlsJob {
            job_uuid: self.job_uuid,
            source_job_uuid: self.source_job_uuid,
            source_type: if self.source_type == "original" {
                HlsSourceType::Original
            } else {
                HlsSourceType::Transcoded
            },
            input_object_key: self.input_object_key,
            hls_config: HlsConfig {
                resolutions,
                segment_duration: self.segment_duration.max(1) as u32,
                list_size: self.list_size.max(0) as u32,
                format: if self.format == "fmp4" {
                    HlsSegmentFormat::Fmp4
                } else {
                    HlsSegmentFormat::Mpegts
                },
            },
            output_dir: self.output_dir,
            master_playlist_url: self.master_playlist_url,
            status: parse_hls_status(&self.status),
            progress: self.progress.max(0) as u8,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn resolutions_json(config: &HlsConfig) -> serde_json::Value {
    let pairs: Vec<(String, i64)> = config
        .resolutions
        .iter()
        .map(|v| (v.resolution.as_str().to_string(), v.bitrate.bps() as i64))
        .collect();
    serde_json::to_value(pairs).expect("resolutions serialize")
}

#[async_trait]
impl HlsJobRepository for PostgresJobStore {
    async fn create(&self, job: &HlsJob) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO hls_jobs
                (job_uuid, source_job_uuid, source_type, input_object_key, resolutions_json,
                 segment_duration, list_size, format, output_dir, status, progress)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.job_uuid)
        .bind(job.source_job_uuid)
        .bind(match job.source_type {
            HlsSourceType::Original => "original",
            HlsSourceType::Transcoded => "transcoded",
        })
        .bind(&job.input_object_key)
        .bind(resolutions_json(&job.hls_config))
        .bind(job.hls_config.segment_duration as i32)
        .bind(job.hls_config.list_size as i32)
        .bind(job.hls_config.format.as_str())
        .bind(&job.output_dir)
        .bind(hls_status_str(job.status))
        .bind(job.progress as i16)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(JobStoreError::DuplicateKey(job.job_uuid)),
            Err(e) => Err(JobStoreError::Database(e.to_string())),
        }
    }

    async fn get(&self, job_uuid: Uuid) -> Result<HlsJob, JobStoreError> {
        let row: Option<HlsRow> = sqlx::query_as(
            r#"SELECT job_uuid, source_job_uuid, source_type, input_object_key, resolutions_json,
                      segment_duration, list_size, format, output_dir, master_playlist_url,
                      status, progress, error_message, created_at, updated_at
               FROM hls_jobs WHERE job_uuid = $1"#,
        )
        .bind(job_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        row.map(HlsRow::into_job).ok_or(JobStoreError::NotFound(job_uuid))
    }

    async fn update_status(
        &self,
        job_uuid: Uuid,
        status: HlsStatus,
        error_message: Option<&str>,
        master_playlist_url: Option<&str>,
        progress: u8,
    ) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE hls_jobs
            SET status = $2,
                error_message = $3,
                master_playlist_url = COALESCE($4, master_playlist_url),
                progress = $5,
                updated_at = now()
            WHERE job_uuid = $1
            "#,
        )
        .bind(job_uuid)
        .bind(hls_status_str(status))
        .bind(error_message)
        .bind(master_playlist_url)
        .bind(progress as i16)
        .execute(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_uuid));
        }
        Ok(())
    }

    async fn update_progress(&self, job_uuid: Uuid, progress: u8) -> Result<(), JobStoreError> {
        let result = sqlx::query("UPDATE hls_jobs SET progress = $2, updated_at = now() WHERE job_uuid = $1")
            .bind(job_uuid)
            .bind(progress as i16)
            .execute(&self.pool)
            .await
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_uuid));
        }
        Ok(())
    }

    async fn query_by_status(&self, status: HlsStatus, limit: i64) -> Result<Vec<HlsJob>, JobStoreError> {
        let rows: Vec<HlsRow> = sqlx::query_as(
            r#"SELECT job_uuid, source_job_uuid, source_type, input_object_key, resolutions_json,
                      segment_duration, list_size, format, output_dir, master_playlist_url,
                      status, progress, error_message, created_at, updated_at
               FROM hls_jobs WHERE status = $1 ORDER BY updated_at ASC LIMIT $2"#,
        )
        .bind(hls_status_str(status))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(HlsRow::into_job).collect())
    }
}
