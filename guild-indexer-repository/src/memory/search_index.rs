//! In-memory search index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use guild_indexer_shared::{GuildDocument, SearchField};
use tokio::sync::RwLock;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{BatchOperationResult, BatchOperationSummary};
use crate::utils;

/// Search index keeping documents in a map keyed by `guildId`.
///
/// Search approximates an OpenSearch match query: a document matches when any lowercase term
/// of the query appears among the terms of the searched field.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: RwLock<BTreeMap<String, GuildDocument>>,
    failing_requests: RwLock<Vec<SearchIndexError>>,
    failing_documents: RwLock<HashMap<String, (SearchIndexError, u32)>>,
    write_calls: AtomicUsize,
    written_ids: RwLock<Vec<String>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` bulk requests fail as a whole with `error`.
    pub async fn fail_next_requests(&self, count: u32, error: SearchIndexError) {
        let mut failing = self.failing_requests.write().await;
        failing.clear();
        failing.extend((0..count).map(|_| error.clone()));
    }

    /// Make the document `guild_id` fail `times` times with `error` before it is accepted.
    pub async fn fail_document(
        &self,
        guild_id: impl Into<String>,
        error: SearchIndexError,
        times: u32,
    ) {
        self.failing_documents
            .write()
            .await
            .insert(guild_id.into(), (error, times));
    }

    /// Number of bulk requests received, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Ids of every document accepted so far, one entry per accepted write.
    pub async fn written_ids(&self) -> Vec<String> {
        self.written_ids.read().await.clone()
    }

    pub async fn get(&self, guild_id: &str) -> Option<GuildDocument> {
        self.documents.read().await.get(guild_id).cloned()
    }

    /// All indexed documents ordered by id.
    pub async fn documents(&self) -> Vec<GuildDocument> {
        self.documents.read().await.values().cloned().collect()
    }

    fn matches(
        document: &GuildDocument,
        field: SearchField,
        query_terms: &HashSet<String>,
    ) -> bool {
        match field {
            SearchField::Description => utils::terms(&document.description)
                .iter()
                .any(|t| query_terms.contains(t)),
            SearchField::Members => document
                .members
                .iter()
                .flatten()
                .flat_map(|name| utils::terms(name))
                .any(|t| query_terms.contains(&t)),
        }
    }
}

#[async_trait]
impl SearchIndexProvider for MemorySearchIndex {
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn bulk_upsert_documents(
        &self,
        documents: &[GuildDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.failing_requests.write().await.pop() {
            return Err(error);
        }

        let mut failing = self.failing_documents.write().await;
        let mut stored = self.documents.write().await;
        let mut written = self.written_ids.write().await;

        let results = documents
            .iter()
            .map(|doc| {
                if let Err(e) = utils::validate_document_id(&doc.guild_id) {
                    return BatchOperationResult {
                        guild_id: doc.guild_id.clone(),
                        success: false,
                        error: Some(e),
                    };
                }
                if let Some((error, remaining)) = failing.get_mut(&doc.guild_id) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return BatchOperationResult {
                            guild_id: doc.guild_id.clone(),
                            success: false,
                            error: Some(error.clone()),
                        };
                    }
                }
                stored.insert(doc.guild_id.clone(), doc.clone());
                written.push(doc.guild_id.clone());
                BatchOperationResult {
                    guild_id: doc.guild_id.clone(),
                    success: true,
                    error: None,
                }
            })
            .collect();

        Ok(BatchOperationSummary::from_results(results))
    }

    async fn search(
        &self,
        field: SearchField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<GuildDocument>, SearchIndexError> {
        let query_terms: HashSet<String> = utils::terms(value).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|doc| Self::matches(doc, field, &query_terms))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_indexer_shared::Guild;

    fn document(id: &str, description: &str, members: Vec<Option<&str>>) -> GuildDocument {
        GuildDocument::from_guild(
            &Guild::new(id, vec![]).with_description(description),
            members.into_iter().map(|m| m.map(str::to_string)).collect(),
        )
    }

    #[tokio::test]
    async fn test_upsert_by_id_keeps_one_document() {
        let index = MemorySearchIndex::new();
        let doc = document("guild1", "play midnight", vec![Some("Black Mage")]);

        index.bulk_upsert_documents(&[doc.clone()]).await.unwrap();
        index.bulk_upsert_documents(&[doc]).await.unwrap();

        assert_eq!(index.documents().await.len(), 1);
        assert_eq!(index.written_ids().await, vec!["guild1", "guild1"]);
    }

    #[tokio::test]
    async fn test_search_description_and_members() {
        let index = MemorySearchIndex::new();
        index
            .bulk_upsert_documents(&[
                document(
                    "guild1",
                    "compete with other guilds! play midnight",
                    vec![Some("Black Mage"), None],
                ),
                document("guild2", "play together", vec![Some("Blue Mage")]),
            ])
            .await
            .unwrap();

        let hits = index.search(SearchField::Description, "Midnight", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].guild_id, "guild1");

        let hits = index.search(SearchField::Members, "blue", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].guild_id, "guild2");

        let hits = index.search(SearchField::Description, "play", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_document_failure_then_success() {
        let index = MemorySearchIndex::new();
        index
            .fail_document("guild2", SearchIndexError::index("shard busy"), 1)
            .await;
        let docs = vec![
            document("guild1", "a", vec![]),
            document("guild2", "b", vec![]),
        ];

        let first = index.bulk_upsert_documents(&docs).await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.failures().next().unwrap().guild_id, "guild2");

        let second = index.bulk_upsert_documents(&docs[1..]).await.unwrap();
        assert_eq!(second.failed, 0);
        assert_eq!(index.documents().await.len(), 2);
    }

    #[tokio::test]
    async fn test_request_failures() {
        let index = MemorySearchIndex::new();
        index
            .fail_next_requests(1, SearchIndexError::connection("refused"))
            .await;

        let docs = vec![document("guild1", "a", vec![])];
        assert!(index.bulk_upsert_documents(&docs).await.is_err());
        assert!(index.bulk_upsert_documents(&docs).await.is_ok());
        assert_eq!(index.write_calls(), 2);
    }
}
