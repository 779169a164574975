//! Loader module for the guild indexer ingest.
//!
//! Buffers enriched documents into windows and delivers each window to the search index in one
//! bulk write. Documents that cannot be delivered are dead-lettered in their original form.

mod kafka_dead_letter;
mod window;

pub use kafka_dead_letter::KafkaDeadLetterStore;
pub use window::{Window, WindowEntry, WindowState};

use std::sync::Arc;
use std::time::Duration;

use guild_indexer_repository::{
    Cursor, DeadLetterError, DeadLetterStore, SearchIndexError, SearchIndexProvider,
};
use guild_indexer_shared::{DeadLetterRecord, FailureClass, GuildDocument};
use tokio::time::Instant;
use tokio_retry::Retry;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::IngestError;
use crate::processor::CreatedGuild;
use crate::retry::RetryPolicy;

/// Configuration for the delivery stage.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of documents that triggers a flush.
    pub max_documents: usize,
    /// Age of the oldest document that triggers a flush.
    pub max_age: Duration,
    /// Attempts per window and backoff between them.
    pub retry: RetryPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_documents: 100,
            max_age: Duration::from_secs(60),
            retry: RetryPolicy::new(2, Duration::from_millis(500)),
        }
    }
}

/// Result of flushing one window.
#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub state: WindowState,
    pub delivered: usize,
    pub dead_lettered: usize,
    pub attempts: u32,
    /// States the flushed window went through, from `Flushing` to its terminal state.
    pub transitions: Vec<WindowState>,
    /// Cursor that may be committed now that the window is terminal.
    pub cursor: Cursor,
}

/// A document that will not be delivered, and why.
struct Rejection {
    entry: WindowEntry,
    class: FailureClass,
    message: String,
    attempts: u32,
}

/// The batching and delivery stage.
///
/// Owns the single open window. Documents stay owned by the stage until their window reaches
/// `Delivered` or `DeadLettered`; only then is the window's cursor handed back for commit.
pub struct DeliveryStage {
    sink: Arc<dyn SearchIndexProvider>,
    dead_letters: Arc<dyn DeadLetterStore>,
    config: LoaderConfig,
    window: Window,
}

impl DeliveryStage {
    /// Create a new delivery stage with default configuration.
    pub fn new(sink: Arc<dyn SearchIndexProvider>, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        Self::with_config(sink, dead_letters, LoaderConfig::default())
    }

    /// Create a new delivery stage with custom configuration.
    pub fn with_config(
        sink: Arc<dyn SearchIndexProvider>,
        dead_letters: Arc<dyn DeadLetterStore>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            sink,
            dead_letters,
            config,
            window: Window::default(),
        }
    }

    /// Check that the search index is reachable and set up.
    pub async fn check_ready(&self) -> Result<(), SearchIndexError> {
        self.sink.ensure_index_exists().await
    }

    /// Number of documents in the open window.
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Add enriched documents, with the cursor of the batch they were polled in.
    ///
    /// Returns `true` when the window is due for a flush.
    pub fn append(
        &mut self,
        guilds: Vec<CreatedGuild>,
        documents: Vec<GuildDocument>,
        cursor: &Cursor,
    ) -> bool {
        for (created, document) in guilds.into_iter().zip(documents) {
            self.window.push(WindowEntry {
                original: created.guild,
                document,
                position: created.position,
            });
        }
        self.window.absorb(cursor);
        self.is_due(Instant::now())
    }

    /// Account for a polled batch that added nothing to the window.
    ///
    /// Returns the cursor to commit right away when no document is pending; otherwise the
    /// cursor waits for the open window to become terminal.
    pub fn absorb_cursor(&mut self, cursor: &Cursor) -> Option<Cursor> {
        if self.window.is_empty() {
            Some(cursor.clone())
        } else {
            self.window.absorb(cursor);
            None
        }
    }

    /// When the open window reaches its maximum age.
    pub fn deadline(&self) -> Option<Instant> {
        self.window.deadline(self.config.max_age)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.window
            .is_due(self.config.max_documents, self.config.max_age, now)
    }

    /// Dead-letter a batch whose enrichment failed, without sending anything to the sink.
    ///
    /// Returns the cursor to commit right away, if any (see [`Self::absorb_cursor`]).
    #[instrument(skip(self, guilds, error, cursor), fields(guild_count = guilds.len()))]
    pub async fn reject(
        &mut self,
        guilds: Vec<CreatedGuild>,
        attempts: u32,
        error: &str,
        cursor: &Cursor,
    ) -> Result<Option<Cursor>, IngestError> {
        let rejections = guilds
            .into_iter()
            .map(|created| {
                let document = GuildDocument::from_guild(&created.guild, Vec::new());
                Rejection {
                    entry: WindowEntry {
                        original: created.guild,
                        document,
                        position: created.position,
                    },
                    class: FailureClass::EnrichmentLookup,
                    message: error.to_string(),
                    attempts,
                }
            })
            .collect();

        self.dead_letter(rejections).await?;
        Ok(self.absorb_cursor(cursor))
    }

    /// Deliver the open window.
    ///
    /// Sends the whole window in one write. On a partial failure only the documents that
    /// failed are sent again on the next attempt; the attempt count is shared by the whole
    /// window. Documents with a non-retryable error are dead-lettered right away, the others
    /// once the attempts run out.
    ///
    /// # Returns
    ///
    /// * `Ok(FlushOutcome)` - The window reached `Delivered` or `DeadLettered`
    /// * `Err(IngestError)` - A dead-letter record could not be written
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<FlushOutcome, IngestError> {
        let (entries, cursor) = self.window.take();
        if entries.is_empty() {
            return Ok(FlushOutcome {
                state: WindowState::Delivered,
                delivered: 0,
                dead_lettered: 0,
                attempts: 0,
                transitions: vec![WindowState::Delivered],
                cursor,
            });
        }

        let total = entries.len();
        let mut pending: Vec<WindowEntry> = entries;
        let mut rejections: Vec<Rejection> = Vec::new();
        let mut delays = self.config.retry.delays();
        let mut attempt: u32 = 0;
        let mut state = WindowState::Flushing;
        let mut transitions = vec![state];
        let mut last_error = String::new();

        loop {
            attempt += 1;
            let documents: Vec<GuildDocument> =
                pending.iter().map(|e| e.document.clone()).collect();

            debug!(attempt, count = documents.len(), state = ?state, "Writing window to search index");

            match self.sink.bulk_upsert_documents(&documents).await {
                Ok(summary) => {
                    let mut still_failing = Vec::new();
                    // Results are in request order. A document without a result was not written.
                    for (i, entry) in pending.into_iter().enumerate() {
                        let (success, error) = summary
                            .results
                            .get(i)
                            .map(|r| (r.success, r.error.as_ref()))
                            .unwrap_or((false, None));
                        match error {
                            None if success => {}
                            Some(e) if !e.is_retryable() => rejections.push(Rejection {
                                entry,
                                class: FailureClass::SinkRejected,
                                message: e.to_string(),
                                attempts: attempt,
                            }),
                            error => {
                                last_error = error
                                    .map(|e| e.to_string())
                                    .unwrap_or_else(|| "document not written".to_string());
                                still_failing.push(entry);
                            }
                        }
                    }
                    pending = still_failing;

                    if summary.failed > 0 {
                        warn!(
                            attempt,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "Bulk upsert completed with some failures"
                        );
                    }
                }
                Err(e) if !e.is_retryable() => {
                    error!(attempt, error = %e, "Search index rejected the window");
                    rejections.extend(pending.drain(..).map(|entry| Rejection {
                        entry,
                        class: FailureClass::SinkRejected,
                        message: e.to_string(),
                        attempts: attempt,
                    }));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Bulk upsert failed");
                    last_error = e.to_string();
                }
            }

            if pending.is_empty() {
                break;
            }
            match delays.next() {
                Some(delay) => {
                    state = WindowState::Retrying {
                        attempt: attempt + 1,
                    };
                    transitions.push(state);
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        rejections.extend(pending.into_iter().map(|entry| Rejection {
            entry,
            class: FailureClass::SinkTransient,
            message: last_error.clone(),
            attempts: attempt,
        }));

        let dead_lettered = rejections.len();
        let delivered = total - dead_lettered;
        self.dead_letter(rejections).await?;

        let state = if dead_lettered == 0 {
            WindowState::Delivered
        } else {
            WindowState::DeadLettered
        };
        transitions.push(state);

        info!(
            delivered,
            dead_lettered,
            attempts = attempt,
            state = ?state,
            "Window flushed"
        );

        Ok(FlushOutcome {
            state,
            delivered,
            dead_lettered,
            attempts: attempt,
            transitions,
            cursor,
        })
    }

    /// Write one dead-letter record per rejection.
    ///
    /// Each write is retried with the stage's backoff; a write that still fails stops the
    /// ingest so that the cursor never moves past a lost record.
    async fn dead_letter(&self, rejections: Vec<Rejection>) -> Result<(), IngestError> {
        for rejection in rejections {
            let record = DeadLetterRecord::new(
                rejection.entry.original,
                rejection.attempts,
                rejection.class,
                rejection.message,
                Some(rejection.entry.position),
            );

            error!(
                guild_id = %record.guild.guild_id,
                attempts = record.attempts,
                error_class = %record.error_class,
                error = %record.error_message,
                "Dead-lettering guild"
            );

            Retry::spawn(self.config.retry.delays(), || self.dead_letters.write(&record))
                .await
                .map_err(|e: DeadLetterError| {
                    IngestError::dead_letter(format!(
                        "Failed to dead-letter guild {}: {}",
                        record.guild.guild_id, e
                    ))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_indexer_repository::memory::{MemoryDeadLetterStore, MemorySearchIndex};
    use guild_indexer_shared::{Guild, SequencePosition};

    fn created(id: &str, offset: i64) -> CreatedGuild {
        CreatedGuild {
            guild: Guild::new(id, vec!["p1".to_string()]),
            position: SequencePosition::new(0, offset),
        }
    }

    fn document(created: &CreatedGuild) -> GuildDocument {
        GuildDocument::from_guild(&created.guild, vec![Some("Black Mage".to_string())])
    }

    fn cursor_after(offset: i64) -> Cursor {
        let mut cursor = Cursor::default();
        cursor.advance(SequencePosition::new(0, offset));
        cursor
    }

    fn stage(
        index: Arc<MemorySearchIndex>,
        dead_letters: Arc<MemoryDeadLetterStore>,
        max_attempts: u32,
    ) -> DeliveryStage {
        DeliveryStage::with_config(
            index,
            dead_letters,
            LoaderConfig {
                max_documents: 3,
                max_age: Duration::from_secs(60),
                retry: RetryPolicy::immediate(max_attempts),
            },
        )
    }

    fn fill(stage: &mut DeliveryStage, ids: &[&str]) -> bool {
        let guilds: Vec<CreatedGuild> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| created(id, i as i64))
            .collect();
        let documents = guilds.iter().map(document).collect();
        stage.append(guilds, documents, &cursor_after(ids.len() as i64 - 1))
    }

    #[tokio::test]
    async fn test_window_is_due_at_max_documents() {
        let mut stage = stage(
            Arc::new(MemorySearchIndex::new()),
            Arc::new(MemoryDeadLetterStore::new()),
            2,
        );

        assert!(!fill(&mut stage, &["guild1", "guild2"]));
        assert!(fill(&mut stage, &["guild3"]));
    }

    #[tokio::test]
    async fn test_flush_delivers_whole_window() {
        let index = Arc::new(MemorySearchIndex::new());
        let mut stage = stage(index.clone(), Arc::new(MemoryDeadLetterStore::new()), 2);
        fill(&mut stage, &["guild1", "guild2"]);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::Delivered);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.cursor.next_offset(0), 2);
        assert_eq!(index.write_calls(), 1);
        assert_eq!(stage.pending(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let index = Arc::new(MemorySearchIndex::new());
        index
            .fail_next_requests(1, SearchIndexError::connection("refused"))
            .await;
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        let mut stage = stage(index.clone(), dead_letters.clone(), 2);
        fill(&mut stage, &["guild1", "guild2"]);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::Delivered);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            outcome.transitions,
            vec![
                WindowState::Flushing,
                WindowState::Retrying { attempt: 2 },
                WindowState::Delivered
            ]
        );
        assert_eq!(index.written_ids().await, vec!["guild1", "guild2"]);
        assert!(dead_letters.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_resubmits_only_failed_documents() {
        let index = Arc::new(MemorySearchIndex::new());
        index
            .fail_document("guild2", SearchIndexError::index("shard busy"), 1)
            .await;
        let mut stage = stage(index.clone(), Arc::new(MemoryDeadLetterStore::new()), 3);
        fill(&mut stage, &["guild1", "guild2", "guild3"]);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::Delivered);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            index.written_ids().await,
            vec!["guild1", "guild3", "guild2"]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_dead_letters_original_guilds() {
        let index = Arc::new(MemorySearchIndex::new());
        index
            .fail_next_requests(5, SearchIndexError::index("unavailable"))
            .await;
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        let mut stage = stage(index.clone(), dead_letters.clone(), 2);
        fill(&mut stage, &["guild1", "guild2"]);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::DeadLettered);
        assert_eq!(outcome.dead_lettered, 2);
        assert_eq!(
            outcome.transitions.last(),
            Some(&WindowState::DeadLettered)
        );
        assert!(outcome.transitions.iter().all(|s| *s != WindowState::Accumulating));
        assert_eq!(outcome.cursor.next_offset(0), 2);
        assert_eq!(index.write_calls(), 2);

        let records = dead_letters.records().await;
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.attempts, 2);
            assert_eq!(record.error_class, FailureClass::SinkTransient);
            assert_eq!(record.guild.members, vec!["p1"]);
        }
    }

    #[tokio::test]
    async fn test_non_retryable_document_is_dead_lettered_immediately() {
        let index = Arc::new(MemorySearchIndex::new());
        index
            .fail_document("guild1", SearchIndexError::rejected("mapper_parsing_exception"), 10)
            .await;
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        let mut stage = stage(index.clone(), dead_letters.clone(), 3);
        fill(&mut stage, &["guild1", "guild2"]);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::DeadLettered);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.attempts, 1);
        let records = dead_letters.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].guild.guild_id, "guild1");
        assert_eq!(records[0].error_class, FailureClass::SinkRejected);
    }

    #[tokio::test]
    async fn test_dead_letter_write_failure_is_fatal() {
        let index = Arc::new(MemorySearchIndex::new());
        index
            .fail_next_requests(5, SearchIndexError::index("unavailable"))
            .await;
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        dead_letters.fail_next_writes(10).await;
        let mut stage = stage(index, dead_letters, 2);
        fill(&mut stage, &["guild1"]);

        assert!(matches!(
            stage.flush().await,
            Err(IngestError::DeadLetterError(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_keeps_cursor_behind_open_window() {
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        let mut stage = stage(
            Arc::new(MemorySearchIndex::new()),
            dead_letters.clone(),
            2,
        );

        let commit = stage
            .reject(vec![created("guild9", 0)], 3, "lookup failed", &cursor_after(0))
            .await
            .unwrap();
        assert_eq!(commit.unwrap().next_offset(0), 1);

        fill(&mut stage, &["guild1"]);
        let commit = stage
            .reject(vec![created("guild8", 5)], 3, "lookup failed", &cursor_after(5))
            .await
            .unwrap();
        assert!(commit.is_none());

        let records = dead_letters.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].error_class, FailureClass::EnrichmentLookup);
        assert_eq!(records[0].attempts, 3);

        let outcome = stage.flush().await.unwrap();
        assert_eq!(outcome.cursor.next_offset(0), 6);
    }

    #[tokio::test]
    async fn test_empty_flush_is_a_no_op() {
        let index = Arc::new(MemorySearchIndex::new());
        let mut stage = stage(index.clone(), Arc::new(MemoryDeadLetterStore::new()), 2);

        let outcome = stage.flush().await.unwrap();

        assert_eq!(outcome.state, WindowState::Delivered);
        assert_eq!(index.write_calls(), 0);
    }
}
