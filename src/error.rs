use thiserror::Error;

/// Top-level error surfaced at the gRPC/HTTP ingress boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobStoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("FFmpeg not found. Searched: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found. Searched: {0}")]
    FfprobeNotFound(String),
}

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("FFmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("FFprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("authentication failed")]
    Auth,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("duplicate job key: {0}")]
    DuplicateKey(uuid::Uuid),

    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue full")]
    Full,

    #[error("queue closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("unknown service: {0}")]
    Unknown(String),

    #[error("resolution failed for {0}: {1}")]
    ResolveFailed(String, String),
}

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("transport error calling {service}: {source}")]
    Transport {
        service: &'static str,
        source: tonic::transport::Error,
    },

    #[error("rpc error calling {service}: {source}")]
    Rpc {
        service: &'static str,
        source: tonic::Status,
    },
}
