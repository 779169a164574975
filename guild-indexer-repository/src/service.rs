//! Guild search service implementation.
//!
//! This module provides the read path over the guild index: one field, one value, a list of
//! matching documents back.

use std::sync::Arc;

use guild_indexer_shared::{GuildDocument, SearchField};
use tracing::{debug, warn};

use crate::config::SearchServiceConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;

/// The query service over the guild search index.
///
/// Every call filters on exactly one field ([`SearchField`]). [`GuildSearchService::search`]
/// never surfaces a failure: backend errors are logged and turn into an empty result set, so the
/// HTTP layer always has a well-formed answer. Callers that need to see the error use
/// [`GuildSearchService::try_search`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use guild_indexer_repository::GuildSearchService;
/// use guild_indexer_repository::memory::MemorySearchIndex;
/// use guild_indexer_shared::SearchField;
///
/// # async fn example() {
/// let service = GuildSearchService::new(Arc::new(MemorySearchIndex::new()));
/// let guilds = service.search(SearchField::Description, "midnight").await;
/// # }
/// ```
pub struct GuildSearchService {
    provider: Arc<dyn SearchIndexProvider>,
    config: SearchServiceConfig,
}

impl GuildSearchService {
    /// Create a new GuildSearchService with default configuration.
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self::with_config(provider, SearchServiceConfig::default())
    }

    /// Create a new GuildSearchService with custom configuration.
    pub fn with_config(
        provider: Arc<dyn SearchIndexProvider>,
        config: SearchServiceConfig,
    ) -> Self {
        Self { provider, config }
    }

    /// Run a match query on `field`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<GuildDocument>)` - The matching documents (at most `max_results`)
    /// * `Err(SearchIndexError::ValidationError)` - If `value` is blank
    /// * `Err(SearchIndexError)` - If the backend query fails
    pub async fn try_search(
        &self,
        field: SearchField,
        value: &str,
    ) -> Result<Vec<GuildDocument>, SearchIndexError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SearchIndexError::validation("search value is required"));
        }

        let hits = self
            .provider
            .search(field, value, self.config.max_results)
            .await?;

        debug!(
            field = field.field_name(),
            value = %value,
            hits = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }

    /// Run a match query on `field`, returning an empty list on any failure.
    pub async fn search(&self, field: SearchField, value: &str) -> Vec<GuildDocument> {
        match self.try_search(field, value).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    field = field.field_name(),
                    value = %value,
                    error = %e,
                    "Search failed, returning no results"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchOperationSummary;
    use async_trait::async_trait;
    use guild_indexer_shared::Guild;
    use tokio::sync::Mutex;

    /// Mock provider for testing
    struct MockProvider {
        queries: Mutex<Vec<(SearchField, String, usize)>>,
        should_fail: bool,
    }

    impl MockProvider {
        fn new(should_fail: bool) -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
                should_fail,
            }
        }
    }

    #[async_trait]
    impl SearchIndexProvider for MockProvider {
        async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
            Ok(())
        }

        async fn bulk_upsert_documents(
            &self,
            documents: &[GuildDocument],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            Ok(BatchOperationSummary::all_succeeded(
                documents.iter().map(|d| d.document_id()),
            ))
        }

        async fn search(
            &self,
            field: SearchField,
            value: &str,
            limit: usize,
        ) -> Result<Vec<GuildDocument>, SearchIndexError> {
            if self.should_fail {
                return Err(SearchIndexError::search("Mock failure"));
            }
            self.queries
                .lock()
                .await
                .push((field, value.to_string(), limit));
            Ok(vec![GuildDocument::from_guild(
                &Guild::new("guild1", vec![]),
                vec![],
            )])
        }
    }

    #[tokio::test]
    async fn test_search_forwards_single_field_and_limit() {
        let provider = Arc::new(MockProvider::new(false));
        let service = GuildSearchService::with_config(
            provider.clone(),
            SearchServiceConfig::with_max_results(5),
        );

        let hits = service.search(SearchField::Members, " Black Mage ").await;

        assert_eq!(hits.len(), 1);
        let queries = provider.queries.lock().await;
        assert_eq!(
            *queries,
            vec![(SearchField::Members, "Black Mage".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_search_failure_yields_empty_result() {
        let service = GuildSearchService::new(Arc::new(MockProvider::new(true)));

        assert!(service.search(SearchField::Description, "midnight").await.is_empty());
        assert!(matches!(
            service.try_search(SearchField::Description, "midnight").await,
            Err(SearchIndexError::SearchError(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_value_is_not_sent() {
        let provider = Arc::new(MockProvider::new(false));
        let service = GuildSearchService::new(provider.clone());

        assert!(service.search(SearchField::Description, "   ").await.is_empty());
        assert!(provider.queries.lock().await.is_empty());
    }
}
