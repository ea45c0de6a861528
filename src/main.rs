use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tonic::transport::Server;
use tracing::{error, info};

use transcode_service::config::Config;
use transcode_service::consumer::{ConsumerConfig, TopicConsumer};
use transcode_service::discovery::{Endpoint, StaticServiceDiscovery};
use transcode_service::ingress::{AdmissionService, grpc::TranscodeIngressService, http};
use transcode_service::job_store::{HlsJobRepository, PostgresJobStore, TranscodeJobRepository};
use transcode_service::lifecycle::LifecycleManager;
use transcode_service::object_store::{ObjectStore, S3BucketConfig, S3ObjectStore};
use transcode_service::queue::BoundedQueue;
use transcode_service::recovery::RecoverySweeper;
use transcode_service::reporter::ResultReporter;
use transcode_service::worker::{HlsWorkerConfig, HlsWorkerPool, TranscodeWorkerConfig, TranscodeWorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(brokers = %config.kafka.brokers, topic = %config.kafka.topic, "loaded configuration");

    let job_store = PostgresJobStore::connect(&config.database.url, config.database.max_connections).await?;
    job_store.migrate().await?;
    let jobs: Arc<dyn TranscodeJobRepository> = Arc::new(job_store.clone());
    let hls_jobs: Arc<dyn HlsJobRepository> = Arc::new(job_store);

    let buckets = S3BucketConfig {
        uploads_bucket: config.s3.bucket_uploads.clone(),
        transcode_bucket: config.s3.bucket_transcode.clone(),
    };
    let object_store: Arc<dyn ObjectStore> =
        Arc::new(S3ObjectStore::from_env(&config.s3.region, config.s3.endpoint_url.as_deref(), buckets).await);

    let mut endpoints = HashMap::new();
    endpoints.insert(
        "upload-service".to_string(),
        Endpoint {
            url: config.grpc.upload_service_url.clone(),
        },
    );
    endpoints.insert(
        "video-service".to_string(),
        Endpoint {
            url: config.grpc.video_service_url.clone(),
        },
    );
    let discovery = Arc::new(StaticServiceDiscovery::new(endpoints));
    let reporter = Arc::new(ResultReporter::new(discovery, config.grpc.timeout));

    let transcode_queue = Arc::new(BoundedQueue::new(config.worker.queue_capacity));
    let hls_queue = Arc::new(BoundedQueue::new(config.worker.queue_capacity));

    let admission = Arc::new(AdmissionService::new(jobs.clone(), transcode_queue.clone()));

    let mut lifecycle = LifecycleManager::new();

    let consumer_config = ConsumerConfig {
        brokers: config.kafka.brokers.clone(),
        topic: config.kafka.topic.clone(),
        group_id: config.kafka.group_id.clone(),
        concurrency: config.worker.max_concurrent_tasks,
        poll_interval: config.worker.task_poll_interval,
        heartbeat_interval: config.worker.heartbeat_interval,
        commit_on_decode_error: config.kafka.commit_on_decode_error,
        commit_on_process_error: config.kafka.commit_on_process_error,
    };
    let mut consumer = TopicConsumer::new(
        consumer_config,
        admission.clone(),
        jobs.clone(),
        transcode_queue.clone(),
        lifecycle.shutdown_signal(),
    )?;
    lifecycle.register("topic-consumer", tokio::spawn(async move { consumer.run().await }));

    let transcode_pool = TranscodeWorkerPool::spawn(
        TranscodeWorkerConfig {
            worker_count: config.worker.max_concurrent_tasks,
            temp_dir: config.ffmpeg.temp_dir.clone(),
            ffmpeg_path: config.ffmpeg.binary_path.clone(),
            ffprobe_path: config.ffmpeg.probe_binary_path.clone(),
            hwaccel: config.ffmpeg.hardware_accel,
        },
        jobs.clone(),
        hls_jobs.clone(),
        object_store.clone(),
        transcode_queue.clone(),
        hls_queue.clone(),
        lifecycle.cancellation_token(),
    );
    let transcode_stats = transcode_pool.stats.clone();
    lifecycle.register("transcode-workers", tokio::spawn(transcode_pool.join()));

    let hls_pool = HlsWorkerPool::spawn(
        HlsWorkerConfig {
            worker_count: config.worker.hls_max_concurrent_tasks,
            temp_dir: config.ffmpeg.temp_dir.clone(),
            ffmpeg_path: config.ffmpeg.binary_path.clone(),
            hwaccel: config.ffmpeg.hardware_accel,
            public_storage_base: config.public_storage_base.clone(),
        },
        hls_jobs.clone(),
        object_store.clone(),
        reporter.clone(),
        hls_queue.clone(),
        lifecycle.cancellation_token(),
    )
    .await;
    let hls_stats = hls_pool.stats.clone();
    lifecycle.register("hls-workers", tokio::spawn(hls_pool.join()));

    let sweeper = RecoverySweeper::new(jobs.clone(), transcode_queue.clone());
    let sweeper_shutdown = lifecycle.shutdown_signal();
    lifecycle.register("recovery-sweeper", tokio::spawn(async move { sweeper.run(sweeper_shutdown).await }));

    let grpc_addr: SocketAddr = config.grpc.bind_addr.parse()?;
    let grpc_service = TranscodeIngressService::new(admission.clone(), jobs.clone()).into_server();
    let grpc_shutdown = lifecycle.shutdown_signal();
    lifecycle.register(
        "grpc-server",
        tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(grpc_service)
                .serve_with_shutdown(grpc_addr, wait_for_shutdown(grpc_shutdown))
                .await
            {
                error!(error = %e, "grpc server exited with error");
            }
        }),
    );

    let http_addr: SocketAddr = config.http_bind_addr.parse()?;
    let http_router = http::router(http::HttpIngressState {
        admission: admission.clone(),
        jobs: jobs.clone(),
        transcode_stats: Some(transcode_stats),
        hls_stats: Some(hls_stats),
    });
    let http_shutdown = lifecycle.shutdown_signal();
    lifecycle.register(
        "http-server",
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(http_addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, http_router)
                        .with_graceful_shutdown(wait_for_shutdown(http_shutdown))
                        .await
                    {
                        error!(error = %e, "http server exited with error");
                    }
                }
                Err(e) => error!(error = %e, "failed to bind http listener"),
            }
        }),
    );

    info!(grpc = %grpc_addr, http = %http_addr, "transcode service started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    transcode_queue.close().await;
    hls_queue.close().await;
    lifecycle.shutdown().await;

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
