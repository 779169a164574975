//! Settings read from the environment.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;
use crate::IndexingError;

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "guild-indexer";

/// Default topic carrying guild change events.
const DEFAULT_GUILD_CHANGES_TOPIC: &str = "guild.changes";

/// Default topic receiving dead-letter records.
const DEFAULT_DEAD_LETTER_TOPIC: &str = "guild.dead-letters";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Where the pipeline reads from and dead-letters to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// PostgreSQL record store, Kafka change topic and Kafka dead-letter topic.
    Kafka,
    /// In-memory record store with built-in change capture and an in-memory dead-letter store.
    Local,
}

impl FromStr for PipelineMode {
    type Err = IndexingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kafka" => Ok(Self::Kafka),
            "local" | "memory" => Ok(Self::Local),
            other => Err(IndexingError::config(format!(
                "PIPELINE_MODE must be 'kafka' or 'local', got '{}'",
                other
            ))),
        }
    }
}

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Every knob of the indexer, parsed once at startup.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub search_index_url: String,
    pub search_index_name: String,
    pub pipeline_mode: PipelineMode,
    pub database_url: Option<String>,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub guild_changes_topic: String,
    pub dead_letter_topic: String,
    /// Window flushes once it holds this many documents.
    pub window_max_documents: usize,
    /// Window flushes once its first document is this old.
    pub window_max_age: Duration,
    pub delivery_max_attempts: u32,
    pub enrichment_max_attempts: u32,
    pub source_max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Batches the source may hand over before it blocks on the delivery stage.
    pub max_outstanding_batches: usize,
    pub query_server_addr: SocketAddr,
    pub source_batch_size: usize,
    pub source_batch_timeout: Duration,
    pub connection_mode: ConnectionMode,
    pub opensearch_retry_interval: Duration,
}

impl IndexerSettings {
    /// Read the settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_INDEX_URL`: OpenSearch server URL (required)
    /// - `SEARCH_INDEX_NAME`: Index holding the guild documents (required)
    /// - `PIPELINE_MODE`: "kafka" or "local" (default: kafka)
    /// - `DATABASE_URL`: PostgreSQL URL (required in kafka mode)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: guild-indexer)
    /// - `GUILD_CHANGES_TOPIC` / `DEAD_LETTER_TOPIC`: Topic names
    /// - `WINDOW_MAX_DOCUMENTS` (default: 100) / `WINDOW_MAX_AGE_MS` (default: 60000)
    /// - `DELIVERY_MAX_ATTEMPTS` (default: 2), `ENRICHMENT_MAX_ATTEMPTS` (default: 3),
    ///   `SOURCE_MAX_ATTEMPTS` (default: 5), `RETRY_BASE_DELAY_MS` (default: 500)
    /// - `MAX_OUTSTANDING_BATCHES` (default: 4)
    /// - `QUERY_SERVER_ADDR` (default: 0.0.0.0:3000)
    /// - `SOURCE_BATCH_SIZE` (default: 5) / `SOURCE_BATCH_TIMEOUT_MS` (default: 2000)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS` (default: 15)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline_mode = match lookup("PIPELINE_MODE") {
            Some(mode) => mode.parse()?,
            None => PipelineMode::Kafka,
        };
        let database_url = lookup("DATABASE_URL");
        if pipeline_mode == PipelineMode::Kafka && database_url.is_none() {
            return Err(IndexingError::config(
                "DATABASE_URL is required when PIPELINE_MODE is 'kafka'",
            ));
        }

        Ok(Self {
            search_index_url: required(&lookup, "SEARCH_INDEX_URL")?,
            search_index_name: required(&lookup, "SEARCH_INDEX_NAME")?,
            pipeline_mode,
            database_url,
            kafka_broker: lookup("KAFKA_BROKER").unwrap_or_else(|| DEFAULT_KAFKA_BROKER.into()),
            kafka_group_id: lookup("KAFKA_GROUP_ID")
                .unwrap_or_else(|| DEFAULT_KAFKA_GROUP_ID.into()),
            guild_changes_topic: lookup("GUILD_CHANGES_TOPIC")
                .unwrap_or_else(|| DEFAULT_GUILD_CHANGES_TOPIC.into()),
            dead_letter_topic: lookup("DEAD_LETTER_TOPIC")
                .unwrap_or_else(|| DEFAULT_DEAD_LETTER_TOPIC.into()),
            window_max_documents: parsed(&lookup, "WINDOW_MAX_DOCUMENTS", 100usize)?.max(1),
            window_max_age: Duration::from_millis(parsed(
                &lookup,
                "WINDOW_MAX_AGE_MS",
                60_000u64,
            )?),
            delivery_max_attempts: parsed(&lookup, "DELIVERY_MAX_ATTEMPTS", 2u32)?.max(1),
            enrichment_max_attempts: parsed(&lookup, "ENRICHMENT_MAX_ATTEMPTS", 3u32)?.max(1),
            source_max_attempts: parsed(&lookup, "SOURCE_MAX_ATTEMPTS", 5u32)?.max(1),
            retry_base_delay: Duration::from_millis(parsed(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                500u64,
            )?),
            max_outstanding_batches: parsed(&lookup, "MAX_OUTSTANDING_BATCHES", 4usize)?.max(1),
            query_server_addr: parsed(
                &lookup,
                "QUERY_SERVER_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            source_batch_size: parsed(&lookup, "SOURCE_BATCH_SIZE", 5usize)?.max(1),
            source_batch_timeout: Duration::from_millis(parsed(
                &lookup,
                "SOURCE_BATCH_TIMEOUT_MS",
                2_000u64,
            )?),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE")),
            opensearch_retry_interval: Duration::from_secs(parsed(
                &lookup,
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )?),
        })
    }

    pub fn delivery_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.delivery_max_attempts, self.retry_base_delay)
    }

    pub fn enrichment_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.enrichment_max_attempts, self.retry_base_delay)
    }

    pub fn source_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.source_max_attempts, self.retry_base_delay)
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, IndexingError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(IndexingError::config(format!("{} is required", name))),
    }
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T, IndexingError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            IndexingError::config(format!("{} has an invalid value '{}': {}", name, raw, e))
        }),
        None => Ok(default),
    }
}
