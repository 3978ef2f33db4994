//! Enrichment Pipeline
//!
//! Background worker pool that embeds newly written records. Producers hand
//! jobs over with [`EnrichmentPipeline::enqueue`], which never blocks: when
//! the bounded queue is full the job is dropped and only a counter moves.
//! Records missed that way are picked up later by
//! [`EnrichmentPipeline::process_pending`].
//!
//! Lifecycle is explicit. `start()` spawns the workers on the current tokio
//! runtime, `stop()` cancels them and waits until each has finished its
//! in-flight job. Both are idempotent and a stopped pipeline can be started
//! again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use knowledge_engine_core::{RecordKind, RecordSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::provider::EmbeddingProvider;
use super::store::EmbeddingStore;
use crate::models::config::PipelineConfig;
use crate::utils::error::{AppError, AppResult};

/// Upper bound on the worker count.
pub const MAX_WORKERS: usize = 4;

// ============================================================================
// Data Types
// ============================================================================

/// One record waiting to be embedded. Lives only inside the queue.
#[derive(Debug, Clone)]
struct EmbeddingJob {
    record_id: String,
    kind: RecordKind,
    content: String,
}

/// Snapshot of the pipeline counters. Counts only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Jobs accepted into the queue
    pub enqueued: u64,
    /// Jobs rejected because the queue was full
    pub dropped: u64,
    /// Jobs embedded and stored
    pub processed: u64,
    /// Jobs whose embed or store step failed
    pub failed: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl PipelineCounters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handles owned while the pool is running.
struct RunningPool {
    sender: mpsc::Sender<EmbeddingJob>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

// ============================================================================
// EnrichmentPipeline
// ============================================================================

pub struct EnrichmentPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<EmbeddingStore>,
    records: Arc<dyn RecordSource>,
    worker_count: usize,
    capacity: usize,
    state: Mutex<Option<RunningPool>>,
    counters: Arc<PipelineCounters>,
}

impl EnrichmentPipeline {
    /// Build a stopped pipeline.
    ///
    /// `worker_count` is clamped to `1..=MAX_WORKERS` and a zero capacity is
    /// raised to one.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<EmbeddingStore>,
        records: Arc<dyn RecordSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            records,
            worker_count: config.worker_count.clamp(1, MAX_WORKERS),
            capacity: config.queue_capacity.max(1),
            state: Mutex::new(None),
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spawn the worker pool on the current tokio runtime.
    ///
    /// Calling `start` on a running pipeline does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` when called outside a tokio runtime.
    pub fn start(&self) -> AppResult<()> {
        let mut state = self.lock_state();
        if state.is_some() {
            debug!("enrichment: start ignored, pipeline already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::internal(format!("enrichment pipeline needs a tokio runtime: {}", e)))?;

        let (sender, receiver) = mpsc::channel::<EmbeddingJob>(self.capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = (0..self.worker_count)
            .map(|worker_id| {
                runtime.spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    cancel.clone(),
                    Arc::clone(&self.provider),
                    Arc::clone(&self.store),
                    Arc::clone(&self.counters),
                ))
            })
            .collect();

        *state = Some(RunningPool {
            sender,
            cancel,
            workers,
        });

        info!(
            workers = self.worker_count,
            capacity = self.capacity,
            provider = self.provider.display_name(),
            "enrichment: pipeline started"
        );
        Ok(())
    }

    /// Cancel the workers and wait for all of them to exit.
    ///
    /// In-flight jobs finish; jobs still queued are discarded. Calling `stop`
    /// on a stopped pipeline does nothing.
    pub async fn stop(&self) {
        let pool = self.lock_state().take();
        let Some(pool) = pool else {
            return;
        };

        pool.cancel.cancel();
        drop(pool.sender);

        for handle in pool.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "enrichment: worker terminated abnormally");
            }
        }

        info!("enrichment: pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_some()
    }

    /// Offer a record to the workers without waiting.
    ///
    /// Returns `true` when the job was queued. A stopped pipeline ignores the
    /// call; a full queue drops the job.
    pub fn enqueue(
        &self,
        record_id: impl Into<String>,
        kind: RecordKind,
        content: impl Into<String>,
    ) -> bool {
        let state = self.lock_state();
        let Some(pool) = state.as_ref() else {
            return false;
        };

        let job = EmbeddingJob {
            record_id: record_id.into(),
            kind,
            content: content.into(),
        };

        match pool.sender.try_send(job) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Number of jobs waiting in the queue. Zero when stopped.
    pub fn queue_size(&self) -> usize {
        self.lock_state()
            .as_ref()
            .map(|pool| pool.sender.max_capacity() - pool.sender.capacity())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Embed records that have no stored vector yet.
    ///
    /// Walks `kinds` (all kinds when `None`) in order, asking the record
    /// source for at most the remaining `limit` records each time. Records
    /// that already hold a vector are skipped. Returns the number embedded,
    /// returning early once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Provider, record source, and store errors are returned to the caller.
    pub async fn process_pending(
        &self,
        kinds: Option<&[RecordKind]>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let kinds = kinds.unwrap_or(RecordKind::all());
        let mut processed = 0usize;

        for &kind in kinds {
            if processed >= limit {
                break;
            }
            if cancel.is_cancelled() {
                info!(processed, "enrichment: backfill cancelled");
                return Ok(processed);
            }

            let pending = self
                .records
                .records_without_embeddings(kind, limit - processed)?;

            for record in pending {
                if cancel.is_cancelled() {
                    info!(processed, "enrichment: backfill cancelled");
                    return Ok(processed);
                }
                if self.store.has_embedding(&record.id)? {
                    continue;
                }

                let vector = self.provider.embed(&record.content).await?;
                self.store
                    .store_embedding(&record.id, kind, &vector, self.provider.model())?;
                processed += 1;
            }
        }

        if processed > 0 {
            info!(processed, "enrichment: backfill complete");
        }
        Ok(processed)
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RunningPool>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EnrichmentPipeline {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = state.take() {
            pool.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("worker_count", &self.worker_count)
            .field("capacity", &self.capacity)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<EmbeddingJob>>>,
    cancel: CancellationToken,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<EmbeddingStore>,
    counters: Arc<PipelineCounters>,
) {
    debug!(worker_id, "enrichment: worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        match embed_and_store(provider.as_ref(), &store, &job).await {
            Ok(()) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id,
                    record_id = %job.record_id,
                    kind = %job.kind,
                    error = %e,
                    "enrichment: failed to embed record"
                );
            }
        }
    }

    debug!(worker_id, "enrichment: worker exiting");
}

async fn embed_and_store(
    provider: &dyn EmbeddingProvider,
    store: &EmbeddingStore,
    job: &EmbeddingJob,
) -> AppResult<()> {
    let vector = provider.embed(&job.content).await?;
    store.store_embedding(&job.record_id, job.kind, &vector, provider.model())
}

// ============================================================================
// Tests
// ============================================================================
