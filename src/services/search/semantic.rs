//! Semantic Search
//!
//! Ranks stored vectors against a query vector and attaches record content
//! from the record source.

use chrono::{DateTime, Utc};
use knowledge_engine_core::{RecordKind, RecordSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::embedding::similarity::{compare_ranked, find_similar_embeddings};
use crate::services::embedding::store::EmbeddingStore;
use crate::utils::error::AppResult;

/// A semantic match with the matched record's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchResult {
    pub record_id: String,
    pub kind: RecordKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub similarity: f32,
}

/// Similarity scan over each kind in `kinds`, merged and re-ranked.
///
/// Vectors whose record no longer exists in the record source are skipped.
pub fn collect_semantic_matches(
    store: &EmbeddingStore,
    records: &dyn RecordSource,
    query_vector: &[f32],
    kinds: &[RecordKind],
    limit: usize,
    min_similarity: f32,
) -> AppResult<Vec<SemanticSearchResult>> {
    let mut results = Vec::new();

    for &kind in kinds {
        for hit in find_similar_embeddings(store, query_vector, kind, limit, min_similarity)? {
            match records.get_record_content(&hit.record_id, kind)? {
                Some(record) => results.push(SemanticSearchResult {
                    record_id: hit.record_id,
                    kind,
                    content: record.content,
                    created_at: record.created_at,
                    similarity: hit.similarity,
                }),
                None => {
                    debug!(record_id = %hit.record_id, kind = %kind, "search: skipping orphaned embedding");
                }
            }
        }
    }

    results.sort_by(|a, b| compare_ranked(a.similarity, &a.record_id, b.similarity, &b.record_id));
    results.truncate(limit);
    Ok(results)
}
