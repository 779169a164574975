//! Change capture source error types.

use thiserror::Error;

/// Errors from polling or committing the change capture source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The read failed but the source is still there; poll again later.
    #[error("Transient source error: {0}")]
    Transient(String),

    /// The source is gone or unusable (deleted stream, unknown topic, bad credentials).
    #[error("Fatal source error: {0}")]
    Fatal(String),
}

impl SourceError {
    /// Create a transient error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a fatal error.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
