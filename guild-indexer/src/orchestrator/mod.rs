//! Orchestrator module for the guild indexer ingest.
//!
//! Coordinates the change source, processor, and loader components, and owns the cursor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use guild_indexer_repository::{ChangeSource, Cursor, SourceError};
use guild_indexer_shared::ChangeEvent;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, Duration, Instant};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::StreamMessage;
use crate::errors::IngestError;
use crate::loader::{DeliveryStage, FlushOutcome};
use crate::processor::{EventFilter, GuildEnricher};
use crate::retry::RetryPolicy;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Polled batches the source may hand over before it blocks on the delivery stage.
    pub max_outstanding_batches: usize,
    /// Retry policy for transient source failures.
    pub source_retry: RetryPolicy,
    /// How often progress is logged.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_outstanding_batches: 4,
            source_retry: RetryPolicy::new(5, Duration::from_millis(500)),
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Counters returned when the orchestrator stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub events_received: u64,
    pub created_kept: u64,
    pub documents_delivered: u64,
    pub documents_dead_lettered: u64,
    pub windows_flushed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_received: AtomicU64,
    created_kept: AtomicU64,
    documents_delivered: AtomicU64,
    documents_dead_lettered: AtomicU64,
    windows_flushed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            created_kept: self.created_kept.load(Ordering::Relaxed),
            documents_delivered: self.documents_delivered.load(Ordering::Relaxed),
            documents_dead_lettered: self.documents_dead_lettered.load(Ordering::Relaxed),
            windows_flushed: self.windows_flushed.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle that stops a running orchestrator.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the orchestrator to stop. The open window is flushed and its cursor committed first.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Receiver that flips to `true` on shutdown. Used by the HTTP server.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Orchestrator that coordinates the ingest components.
///
/// The orchestrator:
/// - Runs the change source in a background task connected by a bounded channel
/// - Routes polled batches through the filter, the enrichment stage and the delivery stage
/// - Commits the cursor only once every event behind it reached a terminal state
/// - Flushes the open window on shutdown
pub struct Orchestrator {
    source: Arc<dyn ChangeSource>,
    filter: EventFilter,
    enricher: GuildEnricher,
    delivery: DeliveryStage,
    config: OrchestratorConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    counters: Arc<Counters>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(
        source: Arc<dyn ChangeSource>,
        filter: EventFilter,
        enricher: GuildEnricher,
        delivery: DeliveryStage,
    ) -> Self {
        Self::with_config(
            source,
            filter,
            enricher,
            delivery,
            OrchestratorConfig::default(),
        )
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        source: Arc<dyn ChangeSource>,
        filter: EventFilter,
        enricher: GuildEnricher,
        delivery: DeliveryStage,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            source,
            filter,
            enricher,
            delivery,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run the orchestrator.
    ///
    /// Blocks until a shutdown is requested or the source fails permanently. In both cases the
    /// open window is flushed and the resulting cursor committed before returning.
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineStats)` - Stopped after a shutdown request
    /// * `Err(IngestError)` - The source failed permanently or a dead-letter write failed
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<PipelineStats, IngestError> {
        info!("Starting guild indexer orchestrator");

        let start = self.source.load_cursor().await?;
        debug!(partitions = start.partitions().count(), "Loaded committed cursor");

        let (event_transmitter, mut event_receiver) =
            mpsc::channel::<StreamMessage>(self.config.max_outstanding_batches.max(1));

        let source_handle = tokio::spawn(run_source(
            Arc::clone(&self.source),
            start,
            self.config.source_retry,
            event_transmitter,
            self.shutdown_tx.subscribe(),
        ));

        info!("Ready to process change events");

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut prev = PipelineStats::default();
        let mut prev_time = std::time::Instant::now();

        let result = loop {
            let deadline = self.delivery.deadline();

            tokio::select! {
                msg = event_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Events { events, cursor }) => {
                            if let Err(e) = self.process_batch(events, cursor).await {
                                break Err(e);
                            }
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Change source failed");
                            break Err(IngestError::source(e));
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Change source stopped");
                            break Ok(());
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    debug!("Window reached its maximum age");
                    if let Err(e) = self.flush().await {
                        break Err(e);
                    }
                }
                _ = progress_timer.tick() => {
                    let stats = self.counters.snapshot();
                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let rate = |current: u64, previous: u64| {
                        if elapsed_secs > 0.0 {
                            (current.saturating_sub(previous) as f64) / elapsed_secs
                        } else {
                            0.0
                        }
                    };

                    info!(
                        events_received = stats.events_received,
                        documents_delivered = stats.documents_delivered,
                        documents_dead_lettered = stats.documents_dead_lettered,
                        pending = self.delivery.pending(),
                        events_per_sec = format!("{:.2}", rate(stats.events_received, prev.events_received)),
                        documents_per_sec = format!("{:.2}", rate(stats.documents_delivered, prev.documents_delivered)),
                        "Processing progress"
                    );

                    prev = stats;
                    prev_time = now;
                }
            }
        };

        // Stop the source (a no-op when it already stopped) and drain what it handed over.
        self.shutdown_tx.send_replace(true);
        let result = match result {
            Ok(()) => self.drain(&mut event_receiver).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            // Nothing more is processed: unblock a source waiting on a full channel.
            event_receiver.close();
            while event_receiver.recv().await.is_some() {}
        }
        let _ = source_handle.await;

        // Flush the partial window so its cursor can be committed, unless a dead-letter
        // write already failed.
        let result = match result {
            Err(e @ IngestError::DeadLetterError(_)) => Err(e),
            other => match self.flush().await {
                Ok(()) => other,
                Err(e) => Err(e),
            },
        };

        let stats = self.counters.snapshot();
        info!(
            events_received = stats.events_received,
            created_kept = stats.created_kept,
            documents_delivered = stats.documents_delivered,
            documents_dead_lettered = stats.documents_dead_lettered,
            windows_flushed = stats.windows_flushed,
            "Orchestrator shutdown complete"
        );

        result.map(|()| stats)
    }

    /// Process batches the source sent before it stopped.
    async fn drain(
        &mut self,
        event_receiver: &mut mpsc::Receiver<StreamMessage>,
    ) -> Result<(), IngestError> {
        while let Some(msg) = event_receiver.recv().await {
            match msg {
                StreamMessage::Events { events, cursor } => {
                    self.process_batch(events, cursor).await?
                }
                StreamMessage::Error(e) => {
                    warn!(error = %e, "Change source failed while stopping");
                }
                StreamMessage::End => break,
            }
        }
        Ok(())
    }

    /// Route one polled batch through the filter, enrichment and delivery stages.
    async fn process_batch(
        &mut self,
        events: Vec<ChangeEvent>,
        cursor: Cursor,
    ) -> Result<(), IngestError> {
        let event_count = events.len();
        self.counters
            .events_received
            .fetch_add(event_count as u64, Ordering::Relaxed);

        let created = self.filter.apply(events);
        self.counters
            .created_kept
            .fetch_add(created.len() as u64, Ordering::Relaxed);

        debug!(
            event_count,
            created_count = created.len(),
            "Processing batch of events"
        );

        if created.is_empty() {
            if let Some(ready) = self.delivery.absorb_cursor(&cursor) {
                self.commit(&ready).await;
            }
            return Ok(());
        }

        match self.enricher.enrich(&created).await {
            Ok(documents) => {
                if self.delivery.append(created, documents, &cursor) {
                    self.flush().await?;
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    guild_count = created.len(),
                    "Enrichment failed, dead-lettering batch"
                );
                let count = created.len() as u64;
                let ready = self
                    .delivery
                    .reject(created, e.attempts(), &e.to_string(), &cursor)
                    .await?;
                self.counters
                    .documents_dead_lettered
                    .fetch_add(count, Ordering::Relaxed);
                if let Some(ready) = ready {
                    self.commit(&ready).await;
                }
            }
        }
        Ok(())
    }

    /// Flush the open window and commit its cursor.
    async fn flush(&mut self) -> Result<(), IngestError> {
        let FlushOutcome {
            state,
            delivered,
            dead_lettered,
            attempts,
            cursor,
            ..
        } = self.delivery.flush().await?;

        if delivered + dead_lettered > 0 {
            self.counters.windows_flushed.fetch_add(1, Ordering::Relaxed);
            self.counters
                .documents_delivered
                .fetch_add(delivered as u64, Ordering::Relaxed);
            self.counters
                .documents_dead_lettered
                .fetch_add(dead_lettered as u64, Ordering::Relaxed);
            debug!(state = ?state, attempts, "Window reached a terminal state");
        }

        self.commit(&cursor).await;
        Ok(())
    }

    /// Persist the cursor. A failed commit only means some events are read again.
    async fn commit(&self, cursor: &Cursor) {
        if cursor.is_empty() {
            return;
        }
        if let Err(e) = self.source.commit(cursor).await {
            warn!(error = %e, "Failed to commit cursor; events will be redelivered");
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}

/// Poll the source until shutdown, handing each batch to the orchestrator.
///
/// Transient poll failures are retried with backoff without moving the cursor. The bounded
/// channel is where backpressure happens: once it is full the source stops polling.
async fn run_source(
    source: Arc<dyn ChangeSource>,
    mut cursor: Cursor,
    retry: RetryPolicy,
    tx: mpsc::Sender<StreamMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let poll = RetryIf::spawn(
            retry.delays(),
            || source.poll(&cursor),
            |e: &SourceError| {
                if e.is_transient() {
                    warn!(error = %e, "Transient source error, retrying");
                }
                e.is_transient()
            },
        );

        let batch = tokio::select! {
            result = poll => result,
            _ = shutdown_rx.changed() => break,
        };

        match batch {
            Ok(batch) => {
                if batch.events.is_empty() && batch.cursor.is_empty() {
                    continue;
                }
                cursor.merge(&batch.cursor);
                let msg = StreamMessage::Events {
                    events: batch.events,
                    cursor: batch.cursor,
                };
                tokio::select! {
                    sent = tx.send(msg) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            Err(e) => {
                error!(error = %e, "Change source failed permanently");
                let _ = tx.send(StreamMessage::Error(e.to_string())).await;
                return;
            }
        }
    }

    let _ = tx.send(StreamMessage::End).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderConfig;
    use async_trait::async_trait;
    use guild_indexer_repository::memory::{
        MemoryDeadLetterStore, MemoryRecordStore, MemorySearchIndex,
    };
    use guild_indexer_repository::ChangeBatch;

    /// Source that fails every poll with the configured error.
    struct FailingSource {
        error: SourceError,
    }

    #[async_trait]
    impl ChangeSource for FailingSource {
        async fn poll(&self, _cursor: &Cursor) -> Result<ChangeBatch, SourceError> {
            Err(self.error.clone())
        }

        async fn commit(&self, _cursor: &Cursor) -> Result<(), SourceError> {
            Ok(())
        }
    }

    fn orchestrator(source: Arc<dyn ChangeSource>) -> Orchestrator {
        let delivery = DeliveryStage::with_config(
            Arc::new(MemorySearchIndex::new()),
            Arc::new(MemoryDeadLetterStore::new()),
            LoaderConfig {
                retry: RetryPolicy::immediate(2),
                ..LoaderConfig::default()
            },
        );
        Orchestrator::with_config(
            source,
            EventFilter::default(),
            GuildEnricher::new(Arc::new(MemoryRecordStore::new()), RetryPolicy::immediate(3)),
            delivery,
            OrchestratorConfig {
                source_retry: RetryPolicy::immediate(3),
                ..OrchestratorConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_fatal_source_error_stops_the_run() {
        let mut orchestrator = orchestrator(Arc::new(FailingSource {
            error: SourceError::fatal("topic deleted"),
        }));

        let result = orchestrator.run().await;

        assert!(matches!(result, Err(IngestError::SourceError(_))));
    }

    #[tokio::test]
    async fn test_source_retries_exhausted_is_fatal() {
        let mut orchestrator = orchestrator(Arc::new(FailingSource {
            error: SourceError::transient("broker unreachable"),
        }));

        let result = orchestrator.run().await;

        assert!(matches!(result, Err(IngestError::SourceError(_))));
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns_empty_stats() {
        let mut orchestrator = orchestrator(Arc::new(FailingSource {
            error: SourceError::transient("never polled"),
        }));
        orchestrator.shutdown_handle().shutdown();

        let stats = orchestrator.run().await.unwrap();

        assert_eq!(stats, PipelineStats::default());
    }
}
