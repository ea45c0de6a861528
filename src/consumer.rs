use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use serde::Deserialize;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ingress::{AdmissionRequest, AdmissionService};
use crate::job_store::TranscodeJobRepository;
use crate::model::TranscodeStatus;
use crate::queue::BoundedQueue;

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Worker pool concurrency (M); also the size of the internal channel
    /// between the fetch loop and the processing workers.
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub commit_on_decode_error: bool,
    pub commit_on_process_error: bool,
}

impl ConsumerConfig {
    /// Freshness window used when counting in-flight PROCESSING jobs:
    /// the max of heartbeat and poll interval, defaulting to 5s.
    fn freshness_window(&self) -> Duration {
        self.heartbeat_interval.max(self.poll_interval).max(Duration::from_secs(5))
    }
}

#[derive(Debug, Deserialize)]
struct TranscodeRequestedEvent {
    user_uuid: Uuid,
    video_uuid: Uuid,
    video_push_uuid: Option<Uuid>,
    input_path: String,
    target_resolution: String,
    target_bitrate: String,
}

/// An owned copy of the parts of a `BorrowedMessage` the processing workers
/// need, extracted eagerly in the fetch loop since rdkafka's borrowed message
/// can't cross a channel/task boundary.
struct QueuedMessage {
    payload: Option<Vec<u8>>,
    request_id: Option<String>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl QueuedMessage {
    fn from_borrowed<M: Message>(msg: &M) -> Self {
        let request_id = msg
            .headers()
            .and_then(|headers| headers.iter().find(|h| h.key == "request-id").and_then(|h| h.value))
            .map(|v| String::from_utf8_lossy(v).to_string());
        Self {
            payload: msg.payload().map(|p| p.to_vec()),
            request_id,
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
        }
    }
}

/// One fetch loop gated by a backpressure check against the transcode
/// queue and in-flight PROCESSING job count, pushing admitted messages
/// through an internal bounded channel to `concurrency` processing workers
/// that share the same admission routine the HTTP/gRPC ingress surfaces use.
pub struct TopicConsumer {
    consumer: Arc<StreamConsumer>,
    config: ConsumerConfig,
    admission: Arc<AdmissionService>,
    jobs: Arc<dyn TranscodeJobRepository>,
    transcode_queue: Arc<BoundedQueue<Uuid>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TopicConsumer {
    pub fn new(
        config: ConsumerConfig,
        admission: Arc<AdmissionService>,
        jobs: Arc<dyn TranscodeJobRepository>,
        transcode_queue: Arc<BoundedQueue<Uuid>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, rdkafka::error::KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .create()?;
        consumer.subscribe(&[&config.topic])?;

        info!(brokers = %config.brokers, topic = %config.topic, group_id = %config.group_id, "topic consumer initialized");

        Ok(Self {
            consumer: Arc::new(consumer),
            config,
            admission,
            jobs,
            transcode_queue,
            shutdown_rx,
        })
    }

    async fn backpressure_active(&self) -> bool {
        let m = self.config.concurrency as i64;
        if self.transcode_queue.size() as i64 >= m {
            return true;
        }
        let window = self.config.freshness_window();
        match self.jobs.query_by_status(TranscodeStatus::Processing, m.max(1)).await {
            Ok(processing) => {
                let now = Utc::now();
                let running = processing
                    .iter()
                    .filter(|j| (now - j.updated_at).to_std().unwrap_or(Duration::ZERO) <= window)
                    .count() as i64;
                running >= m
            }
            Err(e) => {
                warn!(error = %e, "failed to query processing jobs for backpressure check");
                false
            }
        }
    }

    /// Runs the fetch loop and a pool of `concurrency` processing workers
    /// fed by an internal bounded channel. On shutdown the fetch loop exits
    /// promptly and drops its sender; workers drain whatever is already
    /// queued before this function returns.
    pub async fn run(&mut self) {
        info!("starting topic consumer loop");
        let concurrency = self.config.concurrency.max(1);
        let (tx, rx) = mpsc::channel::<QueuedMessage>(concurrency);
        let rx = Arc::new(Mutex::new(rx));

        let mut worker_handles = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let rx = rx.clone();
            let consumer = self.consumer.clone();
            let admission = self.admission.clone();
            let config = self.config.clone();
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let msg = { rx.lock().await.recv().await };
                    match msg {
                        Some(msg) => process_message(&consumer, &admission, &config, msg).await,
                        None => break,
                    }
                }
            }));
        }

        let mut message_stream = self.consumer.stream();
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            if self.backpressure_active().await {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => continue,
                    _ = self.shutdown_rx.changed() => continue,
                }
            }

            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            if tx.send(QueuedMessage::from_borrowed(&msg)).await.is_err() {
                                warn!("processing worker channel closed, stopping fetch loop");
                                break;
                            }
                        }
                        Some(Err(e)) => error!(error = %e, "kafka consumer error"),
                        None => {
                            warn!("message stream ended unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        drop(tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        info!("topic consumer stopped");
    }
}

async fn process_message(
    consumer: &StreamConsumer,
    admission: &AdmissionService,
    config: &ConsumerConfig,
    msg: QueuedMessage,
) {
    let span = tracing::info_span!("process_transcode_message", request_id = msg.request_id.as_deref().unwrap_or(""));
    let _enter = span.enter();

    let payload = match &msg.payload {
        Some(p) => p,
        None => {
            debug!("empty message payload, skipping");
            commit_offset(consumer, &msg);
            return;
        }
    };

    let event: TranscodeRequestedEvent = match serde_json::from_slice(payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "failed to decode transcode request message");
            if config.commit_on_decode_error {
                commit_offset(consumer, &msg);
            }
            return;
        }
    };

    let result = admission
        .admit(AdmissionRequest {
            user_uuid: event.user_uuid,
            video_uuid: event.video_uuid,
            video_push_uuid: event.video_push_uuid,
            input_path: event.input_path,
            target_resolution: event.target_resolution,
            target_bitrate: event.target_bitrate,
        })
        .await;

    match result {
        Ok(job) => {
            info!(job_uuid = %job.job_uuid, "admitted job from topic consumer");
            commit_offset(consumer, &msg);
        }
        Err(e) => {
            warn!(error = %e, "failed to admit job from topic consumer");
            if config.commit_on_process_error {
                commit_offset(consumer, &msg);
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    }
}

fn commit_offset(consumer: &StreamConsumer, msg: &QueuedMessage) {
    let mut tpl = TopicPartitionList::new();
    if let Err(e) = tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1)) {
        error!(error = %e, "failed to build offset commit list");
        return;
    }
    if let Err(e) = consumer.commit(&tpl, CommitMode::Sync) {
        error!(error = %e, "failed to commit offset");
    }
}
