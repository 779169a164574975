//! Kafka change source for the guild indexer.
//!
//! Reads change envelopes from the guild changes topic. Offsets are committed manually, only
//! for cursors the orchestrator hands back once every event before them reached a terminal
//! state.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use guild_indexer_repository::{ChangeBatch, ChangeSource, Cursor, SourceError};
use guild_indexer_shared::SequencePosition;

use crate::consumer::messages::ChangeEnvelope;
use crate::errors::IngestError;

/// Default number of records collected per poll.
const DEFAULT_BATCH_SIZE: usize = 5;

/// Default time a poll waits to fill a batch, in milliseconds.
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 2000;

/// Kafka consumer reading guild change events.
pub struct KafkaChangeSource {
    consumer: StreamConsumer,
    topic: String,
    batch_size: usize,
    batch_timeout: Duration,
}

impl KafkaChangeSource {
    /// Create a new change source subscribed to `topic`.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying the change envelopes
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, IngestError> {
        Self::with_batch_config(
            brokers,
            group_id,
            topic,
            DEFAULT_BATCH_SIZE,
            Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
        )
    }

    /// Create a new change source with custom batch configuration.
    ///
    /// A poll returns after `batch_size` records or `batch_timeout`, whichever comes first.
    pub fn with_batch_config(
        brokers: &str,
        group_id: &str,
        topic: &str,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> Result<Self, IngestError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[topic])?;

        info!(
            brokers = %brokers,
            group_id = %group_id,
            topic = %topic,
            batch_size = batch_size,
            batch_timeout_ms = batch_timeout.as_millis() as u64,
            "Created Kafka change source"
        );

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            batch_size: batch_size.max(1),
            batch_timeout,
        })
    }

    /// Whether a broker error means the source is unusable.
    fn is_fatal(code: RDKafkaErrorCode) -> bool {
        matches!(
            code,
            RDKafkaErrorCode::UnknownTopicOrPartition
                | RDKafkaErrorCode::UnknownTopic
                | RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
        )
    }

    fn classify(err: KafkaError) -> SourceError {
        match err.rdkafka_error_code() {
            Some(code) if Self::is_fatal(code) => SourceError::fatal(err.to_string()),
            _ => SourceError::transient(err.to_string()),
        }
    }
}

#[async_trait]
impl ChangeSource for KafkaChangeSource {
    /// Collect up to `batch_size` records.
    ///
    /// The consumer group tracks the read position, so `_cursor` is only meaningful for sources
    /// that do not keep one themselves.
    #[instrument(skip(self, _cursor))]
    async fn poll(&self, _cursor: &Cursor) -> Result<ChangeBatch, SourceError> {
        let deadline = Instant::now() + self.batch_timeout;
        let mut stream = self.consumer.stream();
        let mut batch = ChangeBatch::default();
        let mut received = 0usize;

        while received < self.batch_size {
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => break,
            };

            match next {
                Some(Ok(msg)) => {
                    received += 1;
                    let position = SequencePosition::new(msg.partition(), msg.offset());
                    batch.cursor.advance(position);
                    if let Some(event) =
                        ChangeEnvelope::decode_record(msg.payload(), msg.key(), position)
                    {
                        batch.events.push(event);
                    }
                }
                Some(Err(e)) if received == 0 => return Err(Self::classify(e)),
                Some(Err(e)) => {
                    // Hand over what was read; the error resurfaces on the next poll.
                    warn!(error = %e, received, "Kafka error after a partial batch");
                    break;
                }
                None => return Err(SourceError::fatal("Kafka stream ended")),
            }
        }

        if received > 0 {
            debug!(
                received,
                events = batch.events.len(),
                "Polled change records from Kafka"
            );
        }
        Ok(batch)
    }

    async fn commit(&self, cursor: &Cursor) -> Result<(), SourceError> {
        if cursor.is_empty() {
            return Ok(());
        }

        let mut tpl = TopicPartitionList::new();
        for (partition, next_offset) in cursor.partitions() {
            tpl.add_partition_offset(&self.topic, partition, Offset::Offset(next_offset))
                .map_err(|e| SourceError::transient(e.to_string()))?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(Self::classify)?;

        debug!(partitions = tpl.count(), "Committed offsets");
        Ok(())
    }
}
