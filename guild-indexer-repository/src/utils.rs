//! Utility functions for the guild indexer repository.

use serde_json::Value;

use crate::errors::{RecordStoreError, SearchIndexError};

/// Extract the primary key of a record.
///
/// The key must be a non-empty string stored under `key_field`.
///
/// # Example
///
/// ```
/// use guild_indexer_repository::utils::record_key;
/// use serde_json::json;
///
/// let key = record_key(&json!({ "playerId": "p1" }), "playerId").expect("valid record");
/// assert_eq!(key, "p1");
/// ```
pub fn record_key(record: &Value, key_field: &str) -> Result<String, RecordStoreError> {
    match record.get(key_field).and_then(Value::as_str) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        Some(_) => Err(RecordStoreError::invalid_record(format!(
            "{} is empty",
            key_field
        ))),
        None => Err(RecordStoreError::invalid_record(format!(
            "{} is missing or not a string",
            key_field
        ))),
    }
}

/// Validate a document id before it is sent to the search index.
pub fn validate_document_id(guild_id: &str) -> Result<(), SearchIndexError> {
    if guild_id.trim().is_empty() {
        return Err(SearchIndexError::validation("guildId is required"));
    }
    Ok(())
}

/// Split text into lowercase alphanumeric terms.
///
/// Used by the in-memory index to approximate a match query.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
