//! Dead-letter store error types.

use thiserror::Error;

/// Errors from writing to the dead-letter store.
#[derive(Debug, Clone, Error)]
pub enum DeadLetterError {
    /// The record could not be serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The store did not accept the record.
    #[error("Write error: {0}")]
    WriteError(String),
}

impl DeadLetterError {
    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }
}
