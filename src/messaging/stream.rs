use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;

// ============================================================================
// Message Stream - transport seam for the consumer loop
// ============================================================================
//
// The consumer loop only needs three things from the transport: the next
// message, a commit for a processed message, and a rewind to re-deliver a
// message it failed to persist. `KafkaMessageStream` provides them over
// rdkafka with auto commit disabled.
//
// ============================================================================

/// An owned copy of one record, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl StreamMessage {
    pub fn key_str(&self) -> String {
        self.key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream transport error: {0}")]
    Transport(String),

    #[error("offset commit failed for {topic}[{partition}]@{offset}: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
}

#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next message.
    async fn next(&mut self) -> Result<StreamMessage, StreamError>;

    /// Mark `message` as processed for the consumer group.
    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError>;

    /// Reposition the partition so `message` is delivered again.
    async fn rewind(&mut self, message: &StreamMessage) -> Result<(), StreamError>;
}

#[derive(Clone, Debug)]
pub struct KafkaStreamConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
}

pub struct KafkaMessageStream {
    consumer: StreamConsumer,
}

impl KafkaMessageStream {
    /// Subscribe to the topic. New groups start at the newest offset; no
    /// backfill happens through the stream.
    pub fn subscribe(config: &KafkaStreamConfig) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "10000")
            .create()
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        tracing::info!(
            brokers = %config.brokers.join(","),
            topic = %config.topic,
            group = %config.group_id,
            "Subscribed to order stream"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageStream for KafkaMessageStream {
    async fn next(&mut self) -> Result<StreamMessage, StreamError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        Ok(StreamMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
        })
    }

    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        let commit_error = |reason: String| StreamError::Commit {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            reason,
        };

        // Committed offset is the next one to read.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| commit_error(e.to_string()))
    }

    async fn rewind(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                Duration::from_secs(5),
            )
            .map_err(|e| StreamError::Transport(e.to_string()))
    }
}
