//! Record store error types.

use thiserror::Error;

/// Errors from record store operations.
///
/// A missing record is never an error: bulk reads simply omit ids they cannot find.
#[derive(Debug, Clone, Error)]
pub enum RecordStoreError {
    /// Could not reach the store.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The store failed to execute a read or write.
    #[error("Query error: {0}")]
    QueryError(String),

    /// A record handed to the store is missing its key field or is not an object.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl RecordStoreError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create an invalid record error.
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Whether the failed call may succeed when issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError(_) | Self::QueryError(_))
    }
}

impl From<sqlx::Error> for RecordStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::ConnectionError(err.to_string())
            }
            _ => Self::QueryError(err.to_string()),
        }
    }
}
