//! Change capture source trait definition.

use async_trait::async_trait;

use crate::errors::SourceError;
use crate::types::{ChangeBatch, Cursor};

/// Ordered feed of change events on the guild entity.
///
/// Events of one partition come back in write order; nothing is promised across partitions.
/// Delivery is at-least-once: after a restart, everything after the last committed cursor is
/// read again.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Cursor to resume from after a restart.
    async fn load_cursor(&self) -> Result<Cursor, SourceError> {
        Ok(Cursor::default())
    }

    /// Read the next events after `cursor`.
    ///
    /// May wait for a bounded time when nothing is available and then return an empty batch.
    async fn poll(&self, cursor: &Cursor) -> Result<ChangeBatch, SourceError>;

    /// Persist `cursor`. Only called once every event before it reached a terminal state.
    async fn commit(&self, cursor: &Cursor) -> Result<(), SourceError>;
}
