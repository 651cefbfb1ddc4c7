//! Kafka implementations of the broker seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    message::{BorrowedMessage, Message},
    producer::{FutureProducer, FutureRecord, Producer},
    Offset, TopicPartitionList,
};
use tracing::{debug, info, warn};

use crate::broker::{InboundMessage, MessageSink, MessageSource, SendError};
use crate::errors::PipelineError;

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer-group member reading one topic with manual offset commits.
///
/// Commits are asynchronous while running; [`MessageSource::close`] commits
/// the last handled offset of every partition synchronously before leaving
/// the group.
pub struct KafkaSource {
    consumer: StreamConsumer,
    group_id: String,
    /// Next offset to read per (topic, partition), as last committed.
    committed: HashMap<(String, i32), i64>,
}

impl KafkaSource {
    /// Create a new Kafka source.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(brokers = %brokers, group_id = %group_id, "Created Kafka consumer");

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
            committed: HashMap::new(),
        })
    }

    fn convert_message(msg: &BorrowedMessage<'_>) -> InboundMessage {
        InboundMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(|k| k.to_vec()),
            payload: msg.payload().map(|p| p.to_vec()),
        }
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn subscribe(&mut self, topic: &str) -> Result<(), PipelineError> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(topic = %topic, group_id = %self.group_id, "Subscribed to Kafka topic");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, PipelineError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => Ok(Some(Self::convert_message(&msg))),
            Ok(Err(e)) => Err(PipelineError::kafka(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), PipelineError> {
        let mut tpl = TopicPartitionList::new();
        // The committed offset is the next one to read.
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| PipelineError::kafka(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        self.committed
            .insert((message.topic.clone(), message.partition), message.offset + 1);
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Offset committed"
        );
        Ok(())
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), PipelineError> {
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Partition rewound for redelivery"
        );
        Ok(())
    }

    async fn close(&mut self) {
        if !self.committed.is_empty() {
            let flushed = final_commit_list(&self.committed).and_then(|tpl| {
                self.consumer.commit(&tpl, CommitMode::Sync)
            });
            match flushed {
                Ok(()) => debug!(partitions = self.committed.len(), "Final offsets committed"),
                Err(e) => warn!(error = %e, "Final offset commit failed; last messages may be redelivered"),
            }
            self.committed.clear();
        }
        self.consumer.unsubscribe();
        info!(group_id = %self.group_id, "Kafka consumer closed");
    }
}

/// Producer that waits for full acknowledgement of every message.
pub struct KafkaSink {
    producer: FutureProducer,
}

impl KafkaSink {
    pub fn new(brokers: &str) -> Result<Self, PipelineError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("acks", "all")
            .set("compression.type", "zstd")
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(brokers = %brokers, "Created Kafka producer");
        Ok(Self { producer })
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SendError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, DELIVERY_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(topic = %topic, key = %key, partition, offset, "Message delivered");
                Ok(())
            }
            Err((e, _)) => Err(send_error(e)),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), SendError> {
        self.producer.flush(timeout).map_err(|e| {
            warn!(error = %e, "Producer flush incomplete");
            send_error(e)
        })
    }
}

/// Offsets to commit at shutdown, one entry per partition.
fn final_commit_list(committed: &HashMap<(String, i32), i64>) -> Result<TopicPartitionList, KafkaError> {
    let mut tpl = TopicPartitionList::new();
    for ((topic, partition), next) in committed {
        tpl.add_partition_offset(topic, *partition, Offset::Offset(*next))?;
    }
    Ok(tpl)
}

fn send_error(error: KafkaError) -> SendError {
    let transient = error.rdkafka_error_code().map_or(false, is_transient_code);
    SendError {
        transient,
        reason: error.to_string(),
    }
}

/// Broker error codes worth another attempt.
pub(crate) fn is_transient_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NotEnoughReplicas
            | RDKafkaErrorCode::NotEnoughReplicasAfterAppend
            | RDKafkaErrorCode::NetworkException
    )
}
