//! Search Integration Tests
//!
//! Semantic and hybrid retrieval over the reference record store.

use std::collections::HashSet;
use std::sync::Arc;

use knowledge_engine::{AppError, EmbeddingProvider, MatchType, RecordKind};

use crate::common::{DownProvider, Harness, KeyedProvider};

/// Three decisions: one reachable both ways, one only by keyword, one only
/// by vector.
fn seeded() -> Harness {
    let h = Harness::new();
    h.records
        .add_record_with_id("d_both", RecordKind::Decision, "use postgres for storage")
        .unwrap();
    h.records
        .add_record_with_id("d_kw", RecordKind::Decision, "postgres replicas in every region")
        .unwrap();
    h.records
        .add_record_with_id("d_sem", RecordKind::Decision, "relational database of record")
        .unwrap();

    h.embeddings
        .store_embedding("d_both", RecordKind::Decision, &[1.0, 0.0], "keyed-v1")
        .unwrap();
    h.embeddings
        .store_embedding("d_sem", RecordKind::Decision, &[0.9, 0.1], "keyed-v1")
        .unwrap();
    h
}

fn postgres_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(KeyedProvider::new(&[("postgres", vec![1.0, 0.0])], vec![0.0, 1.0]))
}

fn down_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(DownProvider)
}

// ============================================================================
// Hybrid
// ============================================================================

#[tokio::test]
async fn test_record_found_both_ways_appears_once() {
    let h = seeded();
    let engine = h.engine(Some(postgres_provider()));

    let outcome = engine.hybrid_search("postgres", &[], Some(10)).await.unwrap();
    assert!(!outcome.semantic_degraded);
    assert_eq!(outcome.provider_display.as_deref(), Some("Keyed (keyed-v1)"));

    let both: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.record_id == "d_both")
        .collect();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].match_type, MatchType::Both);
    assert!(both[0].keyword_score.is_some());
    assert!(both[0].semantic_similarity.is_some());

    let ids: HashSet<&str> = outcome.results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids.len(), outcome.results.len());
}

#[tokio::test]
async fn test_both_matches_rank_first() {
    let h = seeded();
    let engine = h.engine(Some(postgres_provider()));

    let outcome = engine
        .hybrid_search("postgres", &[RecordKind::Decision], Some(10))
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.results[0].record_id, "d_both");
    let rest: HashSet<(&str, MatchType)> = outcome.results[1..]
        .iter()
        .map(|r| (r.record_id.as_str(), r.match_type))
        .collect();
    assert!(rest.contains(&("d_kw", MatchType::Keyword)));
    assert!(rest.contains(&("d_sem", MatchType::Semantic)));
}

#[tokio::test]
async fn test_hybrid_limit_truncates() {
    let h = seeded();
    let engine = h.engine(Some(postgres_provider()));

    let outcome = engine.hybrid_search("postgres", &[], Some(1)).await.unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].record_id, "d_both");
}

#[tokio::test]
async fn test_no_provider_is_keyword_only() {
    let h = seeded();
    let engine = h.engine(None);

    let outcome = engine.hybrid_search("postgres", &[], None).await.unwrap();
    assert!(outcome.semantic_degraded);
    assert!(outcome.provider_display.is_none());
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.match_type == MatchType::Keyword));
}

#[tokio::test]
async fn test_failing_provider_degrades_to_keyword() {
    let h = seeded();
    let engine = h.engine(Some(down_provider()));

    let outcome = engine.hybrid_search("postgres", &[], None).await.unwrap();
    assert!(outcome.semantic_degraded);
    assert!(outcome
        .semantic_error
        .as_deref()
        .is_some_and(|e| e.contains("connection refused")));
    assert_eq!(outcome.results.len(), 2);
}

// ============================================================================
// Semantic
// ============================================================================

#[tokio::test]
async fn test_semantic_search_attaches_content() {
    let h = seeded();
    let engine = h.engine(Some(postgres_provider()));

    let results = engine
        .semantic_search("postgres", &[RecordKind::Decision], 10, 0.5)
        .await
        .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, vec!["d_both", "d_sem"]);
    assert_eq!(results[0].content, "use postgres for storage");
    assert_eq!(results[1].kind, RecordKind::Decision);
}

#[tokio::test]
async fn test_semantic_search_skips_orphaned_vectors() {
    let h = seeded();
    h.embeddings
        .store_embedding("d_gone", RecordKind::Decision, &[1.0, 0.0], "keyed-v1")
        .unwrap();
    let engine = h.engine(Some(postgres_provider()));

    let results = engine
        .semantic_search("postgres", &[], 10, 0.5)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.record_id != "d_gone"));
}

#[tokio::test]
async fn test_semantic_search_errors() {
    let h = seeded();

    let err = h
        .engine(None)
        .semantic_search("postgres", &[], 10, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    let err = h
        .engine(Some(down_provider()))
        .semantic_search("postgres", &[], 10, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Embedding(_)));
}
