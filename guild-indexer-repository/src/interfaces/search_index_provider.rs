//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use guild_indexer_shared::{GuildDocument, SearchField};

use crate::errors::SearchIndexError;
use crate::types::BatchOperationSummary;

/// Abstracts the underlying search index implementation (OpenSearch, in-memory, etc.).
///
/// Implementations are shared between the delivery stage (writes) and the query service
/// (reads), so they must be safe for concurrent use.
///
/// # Upsert semantics
///
/// Documents are keyed by `guild_id`. Writing the same document twice must leave one logical
/// document in the index; the delivery stage relies on this to resubmit whole windows after a
/// failure.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Ensure the search index exists with the expected mappings, creating it if necessary.
    ///
    /// Called once during startup, before any document operation.
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError>;

    /// Upsert a batch of documents in a single write.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Per-document results; some documents may have failed
    /// * `Err(SearchIndexError)` - If the request failed as a whole
    async fn bulk_upsert_documents(
        &self,
        documents: &[GuildDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Run a match query on a single field.
    ///
    /// # Arguments
    ///
    /// * `field` - The field to match against
    /// * `value` - The text to match
    /// * `limit` - Maximum number of documents to return
    async fn search(
        &self,
        field: SearchField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<GuildDocument>, SearchIndexError>;
}
