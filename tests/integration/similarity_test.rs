//! Similarity Integration Tests
//!
//! Cosine similarity and top-K retrieval over vectors stored in SQLite.

use knowledge_engine::services::embedding::find_similar_embeddings;
use knowledge_engine::{cosine_similarity, Database, EmbeddingStore, RecordKind};

fn store_with(vectors: &[(&str, RecordKind, Vec<f32>)]) -> (Database, EmbeddingStore) {
    let db = Database::new_in_memory().unwrap();
    let store = EmbeddingStore::from_database(&db);
    for (id, kind, v) in vectors {
        store.store_embedding(id, *kind, v, "test-model").unwrap();
    }
    (db, store)
}

// ============================================================================
// Cosine similarity
// ============================================================================

#[test]
fn test_self_similarity_is_one() {
    for v in [vec![3.0, 4.0], vec![-1.0, 2.0, 0.5], vec![1e-3; 64]] {
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_degenerate_inputs_score_zero() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
}

// ============================================================================
// Top-K retrieval
// ============================================================================

#[test]
fn test_top_two_ideas_in_order() {
    let (_db, store) = store_with(&[
        ("A", RecordKind::Idea, vec![1.0, 0.0, 0.0]),
        ("B", RecordKind::Idea, vec![0.9, 0.1, 0.0]),
        ("C", RecordKind::Idea, vec![0.0, 1.0, 0.0]),
    ]);

    let results = find_similar_embeddings(&store, &[1.0, 0.0, 0.0], RecordKind::Idea, 2, 0.0)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record_id, "A");
    assert!((results[0].similarity - 1.0).abs() < 1e-6);
    assert_eq!(results[1].record_id, "B");
    assert!((results[1].similarity - 0.994).abs() < 1e-3);
}

#[test]
fn test_limit_and_threshold_are_respected() {
    let vectors: Vec<(String, Vec<f32>)> = (0..20)
        .map(|i| {
            let angle = i as f32 * 0.08;
            (format!("i_{:02}", i), vec![angle.cos(), angle.sin()])
        })
        .collect();
    let db = Database::new_in_memory().unwrap();
    let store = EmbeddingStore::from_database(&db);
    for (id, v) in &vectors {
        store.store_embedding(id, RecordKind::Idea, v, "test-model").unwrap();
    }

    for (limit, min) in [(5, 0.0), (50, 0.9), (3, 0.99), (0, -1.0)] {
        let results =
            find_similar_embeddings(&store, &[1.0, 0.0], RecordKind::Idea, limit, min).unwrap();
        assert!(results.len() <= limit);
        assert!(results.iter().all(|r| r.similarity >= min));
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }
}

#[test]
fn test_equal_scores_break_ties_by_id() {
    let (_db, store) = store_with(&[
        ("d_zeta", RecordKind::Decision, vec![2.0, 0.0]),
        ("d_alpha", RecordKind::Decision, vec![1.0, 0.0]),
        ("d_mid", RecordKind::Decision, vec![5.0, 0.0]),
    ]);

    let ids: Vec<String> = find_similar_embeddings(&store, &[1.0, 0.0], RecordKind::Decision, 10, 0.0)
        .unwrap()
        .into_iter()
        .map(|r| r.record_id)
        .collect();
    assert_eq!(ids, vec!["d_alpha", "d_mid", "d_zeta"]);
}

#[test]
fn test_scan_is_scoped_to_kind() {
    let (_db, store) = store_with(&[
        ("i_1", RecordKind::Idea, vec![1.0, 0.0]),
        ("l_1", RecordKind::Learning, vec![1.0, 0.0]),
    ]);

    let results =
        find_similar_embeddings(&store, &[1.0, 0.0], RecordKind::Learning, 10, 0.0).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record_id, "l_1");
    assert_eq!(results[0].kind, RecordKind::Learning);
}
