//! Error types for the guild indexer ingest.

use guild_indexer_repository::{DeadLetterError, SourceError};
use thiserror::Error;

/// Errors that stop the ingest.
///
/// Stage-local transient failures never surface here: they are retried and, once exhausted,
/// turned into dead-letter records. What remains is what the process cannot work around.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The change source failed permanently or kept failing past its retry budget.
    #[error("Source error: {0}")]
    SourceError(String),

    /// A dead-letter record could not be written; the cursor must not move past it.
    #[error("Dead-letter error: {0}")]
    DeadLetterError(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl IngestError {
    /// Create a source error.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }

    /// Create a dead-letter error.
    pub fn dead_letter(msg: impl Into<String>) -> Self {
        Self::DeadLetterError(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

impl From<SourceError> for IngestError {
    fn from(err: SourceError) -> Self {
        Self::SourceError(err.to_string())
    }
}

impl From<DeadLetterError> for IngestError {
    fn from(err: DeadLetterError) -> Self {
        Self::DeadLetterError(err.to_string())
    }
}
