//! Search index error types.
//!
//! This module defines the unified error type for all search index operations,
//! including the retryable / non-retryable classification the delivery stage relies on.

use thiserror::Error;

/// Unified errors from search index operations.
///
/// Used by the `SearchIndexProvider` trait and the `GuildSearchService`. Every variant is
/// classified by [`SearchIndexError::is_retryable`]: the delivery stage keeps retrying a window
/// only while the errors it sees are retryable.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., missing document id).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the search index backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend failed to index a document (server side or throttling).
    #[error("Index error: {0}")]
    IndexError(String),

    /// Bulk indexing request failed as a whole.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// The backend rejected a document (mapping conflict, malformed document...).
    #[error("Document rejected: {0}")]
    DocumentRejected(String),

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// A search request failed.
    #[error("Search error: {0}")]
    SearchError(String),

    /// Failed to parse response from search index backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search index backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a document rejected error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::DocumentRejected(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a search error.
    pub fn search(msg: impl Into<String>) -> Self {
        Self::SearchError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Classify an HTTP status returned for a document or a whole request.
    ///
    /// Throttling (429), timeouts (408) and server errors (5xx) are retryable index errors;
    /// every other status is a rejection.
    pub fn from_status(status: u16, msg: impl Into<String>) -> Self {
        match status {
            408 | 429 | 500..=599 => Self::IndexError(msg.into()),
            _ => Self::DocumentRejected(msg.into()),
        }
    }

    /// Whether resubmitting the same write may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::IndexError(_)
                | Self::BulkIndexError(_)
                | Self::ParseError(_)
                | Self::Unknown(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(SearchIndexError::from_status(429, "too many requests").is_retryable());
        assert!(SearchIndexError::from_status(503, "unavailable").is_retryable());
        assert!(!SearchIndexError::from_status(400, "mapper_parsing_exception").is_retryable());
        assert!(!SearchIndexError::from_status(409, "version conflict").is_retryable());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!SearchIndexError::validation("missing guildId").is_retryable());
        assert!(!SearchIndexError::serialization("bad doc").is_retryable());
        assert!(SearchIndexError::connection("refused").is_retryable());
    }
}
