use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::video::hwaccel::HwAccel;

fn env_string(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(key: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    env_parsed(key, default_secs).map(Duration::from_secs)
}

fn hwaccel_from_str(s: &str) -> HwAccel {
    match s.to_lowercase().as_str() {
        "cuda" | "nvenc" => HwAccel::Nvenc,
        "vaapi" => HwAccel::Vaapi,
        "qsv" => HwAccel::Qsv,
        "videotoolbox" => HwAccel::VideoToolbox,
        "software" | "none" => HwAccel::Software,
        _ => HwAccel::detect(),
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_concurrent_tasks: usize,
    pub hls_max_concurrent_tasks: usize,
    pub queue_capacity: usize,
    pub task_poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub commit_on_decode_error: bool,
    pub commit_on_process_error: bool,
}

#[derive(Debug, Clone)]
pub struct TranscodeFfmpegConfig {
    pub binary_path: PathBuf,
    pub probe_binary_path: PathBuf,
    pub temp_dir: PathBuf,
    pub hardware_accel: HwAccel,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket_uploads: String,
    pub bucket_transcode: String,
    pub region: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GrpcConfig {
    pub bind_addr: String,
    pub upload_service_url: String,
    pub video_service_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub worker: WorkerConfig,
    pub kafka: KafkaConfig,
    pub ffmpeg: TranscodeFfmpegConfig,
    pub public_storage_base: Option<String>,
    pub database: DatabaseConfig,
    pub s3: S3Config,
    pub grpc: GrpcConfig,
    pub http_bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let max_concurrent_tasks = env_parsed("WORKER_MAX_CONCURRENT_TASKS", 4usize)?;
        let worker = WorkerConfig {
            max_concurrent_tasks,
            hls_max_concurrent_tasks: env_parsed("WORKER_HLS_MAX_CONCURRENT_TASKS", max_concurrent_tasks)?,
            queue_capacity: env_parsed("WORKER_QUEUE_CAPACITY", 100usize)?,
            task_poll_interval: env_duration_secs("WORKER_TASK_POLL_INTERVAL_SECS", 1)?,
            heartbeat_interval: env_duration_secs("WORKER_HEARTBEAT_INTERVAL_SECS", 5)?,
        };

        let kafka = KafkaConfig {
            brokers: env_string("KAFKA_BROKERS", "localhost:9092"),
            topic: env_string("KAFKA_TOPIC", "transcode.tasks"),
            group_id: env_string("KAFKA_GROUP_ID", "transcode-service"),
            commit_on_decode_error: env_parsed("KAFKA_COMMIT_ON_DECODE_ERROR", true)?,
            commit_on_process_error: env_parsed("KAFKA_COMMIT_ON_PROCESS_ERROR", false)?,
        };

        let ffmpeg_path = std::env::var("TRANSCODE_FFMPEG_BINARY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        let ffprobe_path = std::env::var("TRANSCODE_FFPROBE_BINARY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffprobe"));
        let hardware_accel = env_opt_string("TRANSCODE_HARDWARE_ACCEL")
            .map(|v| hwaccel_from_str(&v))
            .unwrap_or_default();
        let ffmpeg = TranscodeFfmpegConfig {
            binary_path: ffmpeg_path,
            probe_binary_path: ffprobe_path,
            temp_dir: std::env::var("TEMP_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./temp")),
            hardware_accel,
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", 10u32)?,
        };

        let s3 = S3Config {
            bucket_uploads: env_string("S3_BUCKET_UPLOADS", "uploads"),
            bucket_transcode: env_string("S3_BUCKET_TRANSCODE", "transcode"),
            region: env_string("S3_REGION", "us-east-1"),
            endpoint_url: env_opt_string("S3_ENDPOINT_URL"),
        };

        let grpc = GrpcConfig {
            bind_addr: env_string("GRPC_BIND_ADDR", "0.0.0.0:50051"),
            upload_service_url: std::env::var("GRPC_UPLOAD_SERVICE_URL")
                .map_err(|_| ConfigError::Missing("GRPC_UPLOAD_SERVICE_URL"))?,
            video_service_url: std::env::var("GRPC_VIDEO_SERVICE_URL")
                .map_err(|_| ConfigError::Missing("GRPC_VIDEO_SERVICE_URL"))?,
            timeout: env_duration_secs("GRPC_TIMEOUT_SECS", 30)?,
        };

        let http_bind_addr = env_string("HTTP_BIND_ADDR", "0.0.0.0:3000");

        Ok(Self {
            worker,
            kafka,
            ffmpeg,
            public_storage_base: env_opt_string("PUBLIC_STORAGE_BASE"),
            database,
            s3,
            grpc,
            http_bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hwaccel_from_str_recognizes_cuda() {
        assert_eq!(hwaccel_from_str("cuda"), HwAccel::Nvenc);
        assert_eq!(hwaccel_from_str("software"), HwAccel::Software);
    }
}
