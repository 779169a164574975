//! Request and response types for repository operations.

use std::collections::BTreeMap;

use guild_indexer_shared::{ChangeEvent, SequencePosition};

use crate::errors::SearchIndexError;

/// Result of a batch operation for a single document.
///
/// Indicates whether the upsert of one document inside a bulk request succeeded and includes
/// error details if it failed.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The guild's unique identifier (document id).
    pub guild_id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// Lets callers handle partial failures: a bulk request can succeed as a whole while some of
/// its documents were not written.
#[derive(Debug, Clone)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from per-document results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Summary for a batch where every document succeeded.
    pub fn all_succeeded<'a>(guild_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_results(
            guild_ids
                .into_iter()
                .map(|id| BatchOperationResult {
                    guild_id: id.to_string(),
                    success: true,
                    error: None,
                })
                .collect(),
        )
    }

    /// Results of the documents that were not written.
    pub fn failures(&self) -> impl Iterator<Item = &BatchOperationResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Read position in the change capture source: the next offset to read, per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    next_offsets: BTreeMap<i32, i64>,
}

impl Cursor {
    /// Next offset to read from `partition` (0 if the partition was never read).
    pub fn next_offset(&self, partition: i32) -> i64 {
        self.next_offsets.get(&partition).copied().unwrap_or(0)
    }

    /// Move past `position`. Never moves a partition backwards.
    pub fn advance(&mut self, position: SequencePosition) {
        let next = self
            .next_offsets
            .entry(position.partition)
            .or_insert(position.offset + 1);
        if *next < position.offset + 1 {
            *next = position.offset + 1;
        }
    }

    /// Merge another cursor into this one, keeping the furthest offset of each partition.
    pub fn merge(&mut self, other: &Cursor) {
        for (partition, offset) in &other.next_offsets {
            self.advance(SequencePosition::new(*partition, offset - 1));
        }
    }

    /// `(partition, next_offset)` pairs in partition order.
    pub fn partitions(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.next_offsets.iter().map(|(p, o)| (*p, *o))
    }

    pub fn is_empty(&self) -> bool {
        self.next_offsets.is_empty()
    }
}

/// Result of one poll of the change capture source.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Events in source order (per partition).
    pub events: Vec<ChangeEvent>,
    /// Cursor positioned after every event of this batch (and every record the source skipped).
    pub cursor: Cursor,
}
