//! Consumer module for the guild indexer ingest.
//!
//! Provides the Kafka change source and the message types exchanged between the source task
//! and the orchestrator.

mod kafka_consumer;
mod messages;

pub use kafka_consumer::KafkaChangeSource;
pub use messages::{ChangeEnvelope, StreamMessage};
