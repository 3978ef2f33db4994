//! Similarity Engine
//!
//! Brute-force cosine ranking over the stored vectors of one record kind.

use std::cmp::Ordering;

use knowledge_engine_core::RecordKind;
use serde::{Deserialize, Serialize};

use super::store::EmbeddingStore;
use crate::utils::error::AppResult;

/// One ranked match from a similarity scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub record_id: String,
    pub kind: RecordKind,
    pub similarity: f32,
}

/// Compute the cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Order two scored ids: higher score first, then id ascending.
pub(crate) fn compare_ranked(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}

/// Score `candidates` against `query`, keep those at or above
/// `min_similarity`, and return the best `limit` of them.
pub fn rank_by_similarity<'a, I>(
    query: &[f32],
    candidates: I,
    kind: RecordKind,
    limit: usize,
    min_similarity: f32,
) -> Vec<SimilarityResult>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<f32>)>,
{
    let mut results: Vec<SimilarityResult> = candidates
        .into_iter()
        .filter_map(|(id, vector)| {
            let similarity = cosine_similarity(query, vector);
            (similarity >= min_similarity).then(|| SimilarityResult {
                record_id: id.clone(),
                kind,
                similarity,
            })
        })
        .collect();

    results.sort_by(|a, b| compare_ranked(a.similarity, &a.record_id, b.similarity, &b.record_id));
    results.truncate(limit);
    results
}

/// Find the stored vectors of `kind` most similar to `query`.
///
/// Every result satisfies `similarity >= min_similarity`; at most `limit`
/// are returned. Equal similarities are ordered by record id ascending.
pub fn find_similar_embeddings(
    store: &EmbeddingStore,
    query: &[f32],
    kind: RecordKind,
    limit: usize,
    min_similarity: f32,
) -> AppResult<Vec<SimilarityResult>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let all = store.get_all_embeddings(kind)?;
    Ok(rank_by_similarity(query, &all, kind, limit, min_similarity))
}
