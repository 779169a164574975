//! In-memory dead-letter store.

use async_trait::async_trait;
use guild_indexer_shared::DeadLetterRecord;
use tokio::sync::RwLock;

use crate::errors::DeadLetterError;
use crate::interfaces::DeadLetterStore;

/// Dead-letter store that keeps every record in a vector.
#[derive(Default)]
pub struct MemoryDeadLetterStore {
    records: RwLock<Vec<DeadLetterRecord>>,
    failing_writes: RwLock<u32>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail.
    pub async fn fail_next_writes(&self, count: u32) {
        *self.failing_writes.write().await = count;
    }

    /// Every record written so far, in write order.
    pub async fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn write(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        {
            let mut failing = self.failing_writes.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(DeadLetterError::write("injected dead-letter write failure"));
            }
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
