//! In-memory change capture source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use guild_indexer_shared::{ChangeEvent, EventKind, SequencePosition};
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::errors::SourceError;
use crate::interfaces::ChangeSource;
use crate::types::{ChangeBatch, Cursor};

const DEFAULT_PARTITIONS: usize = 4;
const DEFAULT_MAX_BATCH: usize = 100;
const DEFAULT_POLL_WAIT: Duration = Duration::from_millis(500);

/// Partitioned, append-only log of guild change events.
///
/// Events are routed to a partition by their key, so all events of one guild keep their write
/// order. A poll that finds nothing waits up to `poll_wait` for an append before returning an
/// empty batch.
pub struct MemoryChangeLog {
    partitions: RwLock<Vec<Vec<ChangeEvent>>>,
    committed: RwLock<Cursor>,
    appended: Notify,
    failing_polls: RwLock<u32>,
    poll_calls: AtomicUsize,
    max_batch: usize,
    poll_wait: Duration,
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS, DEFAULT_MAX_BATCH, DEFAULT_POLL_WAIT)
    }
}

impl MemoryChangeLog {
    pub fn new(partition_count: usize, max_batch: usize, poll_wait: Duration) -> Self {
        Self {
            partitions: RwLock::new(vec![Vec::new(); partition_count.max(1)]),
            committed: RwLock::new(Cursor::default()),
            appended: Notify::new(),
            failing_polls: RwLock::new(0),
            poll_calls: AtomicUsize::new(0),
            max_batch: max_batch.max(1),
            poll_wait,
        }
    }

    fn partition_for(&self, key: &str, partition_count: usize) -> usize {
        let hash = key
            .bytes()
            .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
        hash as usize % partition_count
    }

    /// Append one event and return its position.
    pub async fn append(
        &self,
        kind: EventKind,
        key: impl Into<String>,
        new_image: Option<Value>,
    ) -> SequencePosition {
        let key = key.into();
        let position = {
            let mut partitions = self.partitions.write().await;
            let index = self.partition_for(&key, partitions.len());
            let partition = &mut partitions[index];
            let position = SequencePosition::new(index as i32, partition.len() as i64);
            partition.push(ChangeEvent::new(kind, position, key, new_image));
            position
        };
        self.appended.notify_one();
        debug!(
            partition = position.partition,
            offset = position.offset,
            ?kind,
            "Appended change event"
        );
        position
    }

    /// Make the next `count` polls fail with a transient error.
    pub async fn fail_next_polls(&self, count: u32) {
        *self.failing_polls.write().await = count;
    }

    /// Number of polls received, failed ones included.
    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::Relaxed)
    }

    /// The last committed cursor.
    pub async fn committed(&self) -> Cursor {
        self.committed.read().await.clone()
    }

    /// Total number of events ever appended.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.iter().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn read_after(&self, cursor: &Cursor) -> ChangeBatch {
        let partitions = self.partitions.read().await;
        let mut batch = ChangeBatch::default();

        for (index, partition) in partitions.iter().enumerate() {
            let start = cursor.next_offset(index as i32).max(0) as usize;
            for event in partition.iter().skip(start) {
                if batch.events.len() >= self.max_batch {
                    return batch;
                }
                batch.cursor.advance(event.position);
                batch.events.push(event.clone());
            }
        }
        batch
    }
}

#[async_trait]
impl ChangeSource for MemoryChangeLog {
    async fn load_cursor(&self) -> Result<Cursor, SourceError> {
        Ok(self.committed().await)
    }

    async fn poll(&self, cursor: &Cursor) -> Result<ChangeBatch, SourceError> {
        self.poll_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut failing = self.failing_polls.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(SourceError::transient("injected poll failure"));
            }
        }

        let batch = self.read_after(cursor).await;
        if !batch.events.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(self.poll_wait, self.appended.notified()).await;
        Ok(self.read_after(cursor).await)
    }

    async fn commit(&self, cursor: &Cursor) -> Result<(), SourceError> {
        self.committed.write().await.merge(cursor);
        Ok(())
    }
}
