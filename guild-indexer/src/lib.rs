//! # Guild Indexer
//!
//! Captures writes to the guild table, resolves every member id into a player name and
//! delivers the resulting documents into OpenSearch. Documents that cannot be delivered land
//! in a dead-letter store. An HTTP server answers match queries against the index.
//!
//! ## Architecture
//!
//! The indexer follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Reads change events from the change capture source
//! 2. **Processor**: Keeps created guilds and enriches them with member names
//! 3. **Loader**: Buffers documents into windows and delivers them to the search index
//! 4. **Orchestrator**: Coordinates the flow, the cursor and shutdown
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka change source and envelope decoding
//! - [`processor`]: Event filter and enrichment stage
//! - [`loader`]: Delivery stage and Kafka dead-letter producer
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`server`]: HTTP query surface
//! - [`retry`]: Backoff policy shared by the stages
//! - [`errors`]: Error types for the indexer

pub mod config;
pub mod consumer;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod retry;
pub mod server;

pub use config::{Dependencies, IndexerSettings};
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),

    /// The HTTP query server failed.
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a server error.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::ServerError(msg.into())
    }
}
