//! Kafka dead-letter producer.
//!
//! Publishes every dead-letter record as JSON to the dead-letter topic, keyed by
//! `{guildId}#{failedAt}`.

use std::time::Duration;

use async_trait::async_trait;
use guild_indexer_repository::{DeadLetterError, DeadLetterStore};
use guild_indexer_shared::DeadLetterRecord;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::errors::IngestError;

/// Default delivery timeout of one record.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Dead-letter store backed by a Kafka topic.
pub struct KafkaDeadLetterStore {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetterStore {
    /// Create a producer for `topic`.
    pub fn new(brokers: &str, topic: &str) -> Result<Self, IngestError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", DEFAULT_SEND_TIMEOUT.as_millis().to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()?;

        info!(brokers = %brokers, topic = %topic, "Created Kafka dead-letter producer");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            timeout: DEFAULT_SEND_TIMEOUT,
        })
    }
}

#[async_trait]
impl DeadLetterStore for KafkaDeadLetterStore {
    async fn write(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| DeadLetterError::serialization(e.to_string()))?;
        let key = record.dead_letter_key();

        let message = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(&payload);

        match self.producer.send(message, self.timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %self.topic,
                    partition = partition,
                    offset = offset,
                    key = %key,
                    "Dead-letter record published"
                );
                Ok(())
            }
            Err((e, _)) => {
                error!(
                    topic = %self.topic,
                    key = %key,
                    error = %e,
                    "Failed to publish dead-letter record"
                );
                Err(DeadLetterError::write(e.to_string()))
            }
        }
    }
}
