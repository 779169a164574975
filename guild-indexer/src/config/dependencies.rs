//! Dependency initialization and wiring for the guild indexer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ConnectionMode, IndexerSettings, PipelineMode};
use crate::consumer::KafkaChangeSource;
use crate::loader::{DeliveryStage, KafkaDeadLetterStore, LoaderConfig};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::processor::{EventFilter, GuildEnricher};
use crate::server::AppState;
use crate::IndexingError;
use guild_indexer_repository::memory::{MemoryChangeLog, MemoryDeadLetterStore, MemoryRecordStore};
use guild_indexer_repository::opensearch::IndexConfig;
use guild_indexer_repository::{
    ChangeSource, DeadLetterStore, GuildSearchService, OpenSearchProvider, PostgresRecordStore,
    RecordStore, SchemaRegistry, SearchIndexProvider,
};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    /// State of the HTTP query server. Shares the record store with the pipeline.
    pub app_state: AppState,
}

impl Dependencies {
    /// Initialize all dependencies from the settings.
    ///
    /// The search index is always OpenSearch. `PipelineMode::Kafka` reads guilds and players
    /// from PostgreSQL, change events from the guild changes topic and dead-letters to a Kafka
    /// topic. `PipelineMode::Local` keeps everything else in memory, with the record store
    /// feeding its own change log.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new(settings: &IndexerSettings) -> Result<Self, IndexingError> {
        info!(
            search_index_url = %settings.search_index_url,
            search_index_name = %settings.search_index_name,
            pipeline_mode = ?settings.pipeline_mode,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.opensearch_retry_interval.as_secs(),
            "Initializing dependencies"
        );

        // Initialize OpenSearch provider with retry logic
        let search_provider = Self::connect_to_opensearch(
            &settings.search_index_url,
            IndexConfig::new(settings.search_index_name.clone()),
            settings.connection_mode,
            settings.opensearch_retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        // Exits if the index cannot be created
        search_provider
            .ensure_index_exists()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to ensure index exists: {}", e)))?;

        let search_provider: Arc<dyn SearchIndexProvider> = Arc::new(search_provider);

        let (store, source, dead_letters) = match settings.pipeline_mode {
            PipelineMode::Kafka => Self::kafka_collaborators(settings).await?,
            PipelineMode::Local => Self::local_collaborators(),
        };

        let enricher = GuildEnricher::new(Arc::clone(&store), settings.enrichment_retry());
        let delivery = DeliveryStage::with_config(
            Arc::clone(&search_provider),
            dead_letters,
            LoaderConfig {
                max_documents: settings.window_max_documents,
                max_age: settings.window_max_age,
                retry: settings.delivery_retry(),
            },
        );

        let orchestrator = Orchestrator::with_config(
            source,
            EventFilter::default(),
            enricher,
            delivery,
            OrchestratorConfig {
                max_outstanding_batches: settings.max_outstanding_batches,
                source_retry: settings.source_retry(),
                ..OrchestratorConfig::default()
            },
        );

        let app_state = AppState {
            store,
            search: Arc::new(GuildSearchService::new(search_provider)),
        };

        Ok(Self {
            orchestrator,
            app_state,
        })
    }

    async fn kafka_collaborators(
        settings: &IndexerSettings,
    ) -> Result<
        (
            Arc<dyn RecordStore>,
            Arc<dyn ChangeSource>,
            Arc<dyn DeadLetterStore>,
        ),
        IndexingError,
    > {
        let database_url = settings.database_url.as_deref().ok_or_else(|| {
            IndexingError::config("DATABASE_URL is required when PIPELINE_MODE=kafka")
        })?;

        let store = PostgresRecordStore::new(database_url, SchemaRegistry::standard())
            .await
            .map_err(|e| IndexingError::config(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!("PostgreSQL record store connected");

        let source = KafkaChangeSource::with_batch_config(
            &settings.kafka_broker,
            &settings.kafka_group_id,
            &settings.guild_changes_topic,
            settings.source_batch_size,
            settings.source_batch_timeout,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;

        info!(topic = %settings.guild_changes_topic, "Kafka change source created");

        let dead_letters =
            KafkaDeadLetterStore::new(&settings.kafka_broker, &settings.dead_letter_topic)
                .map_err(|e| {
                    IndexingError::config(format!("Failed to create Kafka producer: {}", e))
                })?;

        info!(topic = %settings.dead_letter_topic, "Kafka dead-letter producer created");

        let store: Arc<dyn RecordStore> = Arc::new(store);
        let source: Arc<dyn ChangeSource> = Arc::new(source);
        let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(dead_letters);
        Ok((store, source, dead_letters))
    }

    fn local_collaborators() -> (
        Arc<dyn RecordStore>,
        Arc<dyn ChangeSource>,
        Arc<dyn DeadLetterStore>,
    ) {
        let change_log = Arc::new(MemoryChangeLog::default());
        let store: Arc<dyn RecordStore> =
            Arc::new(MemoryRecordStore::with_change_log(Arc::clone(&change_log)));
        let source: Arc<dyn ChangeSource> = change_log;
        let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(MemoryDeadLetterStore::new());

        info!("Using in-memory record store, change log and dead-letter store");

        (store, source, dead_letters)
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match OpenSearchProvider::new(url, index_config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            search_index_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
