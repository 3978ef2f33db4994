//! Enrichment Pipeline Integration Tests
//!
//! Lifecycle, drop-on-full backpressure, and backfill through the engine
//! facade and the reference record store.

use std::sync::Arc;
use std::time::Duration;

use knowledge_engine::{EmbeddingProvider, EngineConfig, HeuristicAnalyzer, RecordKind};
use tokio_util::sync::CancellationToken;

use crate::common::{CancellingProvider, GatedProvider, Harness, KeyedProvider};

fn sized(workers: usize, capacity: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.pipeline.worker_count = workers;
    config.pipeline.queue_capacity = capacity;
    config
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stopped_pipeline_ignores_enqueue() {
    let h = Harness::new();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeyedProvider::new(&[], vec![1.0]));
    let engine = h.engine_with(sized(1, 2), Some(provider), Arc::new(HeuristicAnalyzer::new()));

    // Never started.
    for i in 0..3 {
        assert!(!engine.enqueue(format!("i_{}", i), RecordKind::Idea, "text"));
        assert_eq!(engine.queue_size(), 0);
    }

    // Started, then stopped.
    engine.start().unwrap();
    engine.stop().await;
    for i in 0..3 {
        assert!(!engine.enqueue(format!("i_{}", i), RecordKind::Idea, "text"));
        assert_eq!(engine.queue_size(), 0);
    }

    assert_eq!(engine.pipeline_stats().enqueued, 0);
    assert!(engine.get_all_embeddings(RecordKind::Idea).unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueued_records_get_embedded() {
    let h = Harness::new();
    let provider = Arc::new(KeyedProvider::new(
        &[("alpha", vec![1.0, 0.0]), ("beta", vec![0.0, 1.0])],
        vec![0.5, 0.5],
    ));
    let engine = h.engine_with(
        sized(4, 10),
        Some(provider.clone() as Arc<dyn EmbeddingProvider>),
        Arc::new(HeuristicAnalyzer::new()),
    );

    engine.start().unwrap();
    engine.start().unwrap();
    assert!(engine.enqueue("i_1", RecordKind::Idea, "alpha"));
    assert!(engine.enqueue("d_1", RecordKind::Decision, "beta"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.pipeline_stats().processed < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers should drain the queue");

    engine.stop().await;
    engine.stop().await;

    assert_eq!(engine.get_embedding("i_1").unwrap(), Some(vec![1.0, 0.0]));
    assert_eq!(engine.get_embedding("d_1").unwrap(), Some(vec![0.0, 1.0]));
    assert_eq!(provider.calls(), 2);
}

// ============================================================================
// Backpressure
// ============================================================================

#[tokio::test]
async fn test_full_queue_drops_without_blocking() {
    let h = Harness::new();
    let provider = Arc::new(GatedProvider::new());
    let engine = h.engine_with(
        sized(1, 2),
        Some(provider.clone() as Arc<dyn EmbeddingProvider>),
        Arc::new(HeuristicAnalyzer::new()),
    );

    engine.start().unwrap();

    // Park the only worker inside the provider.
    assert!(engine.enqueue("i_busy", RecordKind::Idea, "busy"));
    tokio::time::timeout(Duration::from_secs(5), provider.started.notified())
        .await
        .expect("worker should pick up the first job");

    assert!(engine.enqueue("i_1", RecordKind::Idea, "one"));
    assert!(engine.enqueue("i_2", RecordKind::Idea, "two"));
    assert!(!engine.enqueue("i_3", RecordKind::Idea, "three"));
    assert_eq!(engine.queue_size(), 2);

    let stats = engine.pipeline_stats();
    assert_eq!(stats.enqueued, 3);
    assert_eq!(stats.dropped, 1);

    provider.open();
    engine.stop().await;
    assert!(!engine.is_running());
    assert_eq!(engine.queue_size(), 0);
    assert!(engine.get_embedding("i_busy").unwrap().is_some());
}

// ============================================================================
// Backfill
// ============================================================================

#[tokio::test]
async fn test_backfill_skips_records_with_vectors() {
    let h = Harness::new();
    h.records
        .add_record_with_id("i_done", RecordKind::Idea, "already embedded")
        .unwrap();
    h.records
        .add_record_with_id("i_new", RecordKind::Idea, "fresh idea")
        .unwrap();
    h.records
        .add_record_with_id("l_new", RecordKind::Learning, "fresh learning")
        .unwrap();
    h.embeddings
        .store_embedding("i_done", RecordKind::Idea, &[9.0, 9.0], "manual")
        .unwrap();

    let provider = Arc::new(KeyedProvider::new(&[], vec![1.0, 0.0]));
    let engine = h.engine(Some(provider.clone() as Arc<dyn EmbeddingProvider>));

    let cancel = CancellationToken::new();
    assert_eq!(engine.process_pending(None, 100, &cancel).await.unwrap(), 2);
    assert_eq!(engine.get_embedding("i_done").unwrap(), Some(vec![9.0, 9.0]));
    assert!(!provider.embedded().contains(&"already embedded".to_string()));

    // A second pass finds nothing left to do.
    assert_eq!(engine.process_pending(None, 100, &cancel).await.unwrap(), 0);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_backfill_recovers_dropped_jobs() {
    let h = Harness::new();
    for i in 0..3 {
        h.records
            .add_record_with_id(&format!("d_{}", i), RecordKind::Decision, "decision text")
            .unwrap();
    }
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeyedProvider::new(&[], vec![0.0, 1.0]));
    let engine = h.engine(Some(provider));

    // Not running: every enqueue is lost.
    for i in 0..3 {
        assert!(!engine.enqueue(format!("d_{}", i), RecordKind::Decision, "decision text"));
    }

    let done = engine
        .process_pending(Some(&[RecordKind::Decision]), 10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(done, 3);
    assert_eq!(engine.get_all_embeddings(RecordKind::Decision).unwrap().len(), 3);
}

#[tokio::test]
async fn test_backfill_respects_limit_and_cancellation() {
    let h = Harness::new();
    for i in 0..5 {
        h.records
            .add_record_with_id(&format!("i_{}", i), RecordKind::Idea, "some idea")
            .unwrap();
    }
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeyedProvider::new(&[], vec![1.0]));
    let engine = h.engine(Some(provider));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert_eq!(engine.process_pending(None, 10, &cancelled).await.unwrap(), 0);

    let live = CancellationToken::new();
    assert_eq!(engine.process_pending(None, 2, &live).await.unwrap(), 2);
    assert_eq!(engine.embedding_stats().unwrap().total, 2);
}

#[tokio::test]
async fn test_backfill_stops_when_cancelled_mid_scan() {
    let h = Harness::new();
    for i in 0..4 {
        h.records
            .add_record_with_id(&format!("i_{}", i), RecordKind::Idea, "some idea")
            .unwrap();
    }
    let cancel = CancellationToken::new();
    let provider = Arc::new(CancellingProvider::new(cancel.clone()));
    let engine = h.engine(Some(provider.clone() as Arc<dyn EmbeddingProvider>));

    let done = engine.process_pending(None, 10, &cancel).await.unwrap();

    assert_eq!(done, 1);
    assert_eq!(provider.calls(), 1);
    assert!(cancel.is_cancelled());
    assert_eq!(engine.embedding_stats().unwrap().total, 1);
    assert_eq!(engine.get_all_embeddings(RecordKind::Idea).unwrap().len(), 1);
}
