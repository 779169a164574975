//! Dead-letter store trait definition.

use async_trait::async_trait;
use guild_indexer_shared::DeadLetterRecord;

use crate::errors::DeadLetterError;

/// Append-only store for permanently failed guilds.
///
/// Records are keyed by [`DeadLetterRecord::dead_letter_key`].
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Append one record.
    async fn write(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError>;
}
