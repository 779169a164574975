//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use guild_indexer_shared::{GuildDocument, SearchField};
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{get_index_settings, IndexConfig};
use crate::types::{BatchOperationResult, BatchOperationSummary};
use crate::utils;

/// OpenSearch provider implementation.
///
/// Documents are written with the bulk `index` action using `guildId` as `_id`, which replaces
/// any previous version of the document and makes redelivery idempotent.
///
/// # Example
///
/// ```ignore
/// use guild_indexer_repository::opensearch::{IndexConfig, OpenSearchProvider};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", IndexConfig::new("guild-index")).await?;
/// provider.ensure_index_exists().await?;
/// let summary = provider.bulk_upsert_documents(&documents).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            index = %index_config.name,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Build the NDJSON lines of a bulk request: one `index` action followed by the source of
    /// each document.
    fn bulk_lines(documents: &[GuildDocument]) -> Result<Vec<Value>, SearchIndexError> {
        let mut lines = Vec::with_capacity(documents.len() * 2);
        for doc in documents {
            utils::validate_document_id(&doc.guild_id)?;
            let source = serde_json::to_value(doc)
                .map_err(|e| SearchIndexError::serialization(e.to_string()))?;
            lines.push(json!({ "index": { "_id": doc.document_id() } }));
            lines.push(source);
        }
        Ok(lines)
    }

    /// Turn a bulk response body into per-document results.
    ///
    /// Items come back in request order, so they are matched to `documents` by position.
    fn parse_bulk_response(documents: &[GuildDocument], body: &Value) -> BatchOperationSummary {
        let items = body["items"].as_array().cloned().unwrap_or_default();

        let results = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let item = items.get(i).map(|item| &item["index"]);
                let error = match item {
                    None => Some(SearchIndexError::parse(format!(
                        "missing bulk item for document {}",
                        doc.guild_id
                    ))),
                    Some(item) => {
                        let status = item["status"].as_u64().unwrap_or(0) as u16;
                        if item.get("error").is_some() || !(200..300).contains(&status) {
                            let reason = format!(
                                "{}: {}",
                                item["error"]["type"].as_str().unwrap_or("unknown"),
                                item["error"]["reason"].as_str().unwrap_or("no reason given")
                            );
                            Some(SearchIndexError::from_status(status, reason))
                        } else {
                            None
                        }
                    }
                };

                BatchOperationResult {
                    guild_id: doc.guild_id.clone(),
                    success: error.is_none(),
                    error,
                }
            })
            .collect();

        BatchOperationSummary::from_results(results)
    }

    /// Build a match query on a single field.
    fn match_query(field: SearchField, value: &str) -> Value {
        json!({
            "query": {
                "match": {
                    field.field_name(): {
                        "query": value
                    }
                }
            }
        })
    }

    /// Extract the `_source` of every hit.
    fn parse_search_hits(body: &Value) -> Result<Vec<GuildDocument>, SearchIndexError> {
        let hits = body["hits"]["hits"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("response has no hits array"))?;

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            match serde_json::from_value::<GuildDocument>(hit["_source"].clone()) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(
                        id = %hit["_id"],
                        error = %e,
                        "Skipping search hit that does not decode as a guild document"
                    );
                }
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        let index = self.index_config.name.as_str();

        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another instance may have created the index between the two calls.
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Index creation failed");
            return Err(SearchIndexError::index_creation(format!(
                "Index creation failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %index, "Created search index");
        Ok(())
    }

    async fn bulk_upsert_documents(
        &self,
        documents: &[GuildDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::from_results(Vec::new()));
        }

        let body: Vec<JsonBody<Value>> = Self::bulk_lines(documents)?
            .into_iter()
            .map(JsonBody::new)
            .collect();

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_config.name))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchIndexError::from_status(
                status.as_u16(),
                format!("Bulk request failed with status {}: {}", status, error_body),
            ));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = Self::parse_bulk_response(documents, &body);
        debug!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk upsert completed"
        );
        Ok(summary)
    }

    async fn search(
        &self,
        field: SearchField,
        value: &str,
        limit: usize,
    ) -> Result<Vec<GuildDocument>, SearchIndexError> {
        let response = self
            .client
            .search(SearchParts::Index(&[self.index_config.name.as_str()]))
            .size(limit as i64)
            .body(Self::match_query(field, value))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::search(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Self::parse_search_hits(&body)
    }
}
