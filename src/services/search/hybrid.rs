//! Hybrid Search Engine
//!
//! Runs keyword search and, when a provider is configured, semantic search
//! for each requested record kind, then merges the two result sets by
//! record id.
//!
//! ## Ordering
//!
//! Records found by both channels come first. Within the same group results
//! are ordered by `semantic_similarity + keyword_score` descending, with
//! record id ascending as the final tie-break.
//!
//! ## Degradation
//!
//! Without a provider, or when the semantic channel fails, the search still
//! returns keyword results and reports the reason in the outcome.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use knowledge_engine_core::{KeywordHit, KeywordSearch, RecordKind, RecordSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::semantic::{collect_semantic_matches, SemanticSearchResult};
use crate::models::config::SearchConfig;
use crate::services::embedding::provider::EmbeddingProvider;
use crate::services::embedding::store::EmbeddingStore;
use crate::utils::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which channels found a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Both,
    Keyword,
    Semantic,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Both => "both",
            MatchType::Keyword => "keyword",
            MatchType::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A merged search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResult {
    pub record_id: String,
    pub kind: RecordKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub match_type: MatchType,
    /// Keyword rank score, higher is better.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_similarity: Option<f32>,
    /// Sum of the available channel scores.
    pub combined_score: f64,
}

/// Outcome of a hybrid search, wrapping results with degradation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchOutcome {
    pub results: Vec<HybridResult>,
    /// `true` when the semantic channel was skipped or failed.
    pub semantic_degraded: bool,
    /// Human-readable reason when `semantic_degraded` is `true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_error: Option<String>,
    /// Embedding provider display name, e.g. "Ollama (nomic-embed-text)".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_display: Option<String>,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge keyword and semantic results by record id and rank them.
pub fn merge_results(
    keyword: Vec<KeywordHit>,
    semantic: Vec<SemanticSearchResult>,
    limit: usize,
) -> Vec<HybridResult> {
    let mut merged: HashMap<String, HybridResult> = HashMap::new();

    for hit in keyword {
        merged.entry(hit.id.clone()).or_insert(HybridResult {
            record_id: hit.id,
            kind: hit.kind,
            content: hit.content,
            created_at: hit.created_at,
            match_type: MatchType::Keyword,
            keyword_score: Some(hit.score),
            semantic_similarity: None,
            combined_score: 0.0,
        });
    }

    for sem in semantic {
        match merged.get_mut(&sem.record_id) {
            Some(existing) => {
                existing.match_type = MatchType::Both;
                existing.semantic_similarity = Some(sem.similarity);
            }
            None => {
                merged.insert(
                    sem.record_id.clone(),
                    HybridResult {
                        record_id: sem.record_id,
                        kind: sem.kind,
                        content: sem.content,
                        created_at: sem.created_at,
                        match_type: MatchType::Semantic,
                        keyword_score: None,
                        semantic_similarity: Some(sem.similarity),
                        combined_score: 0.0,
                    },
                );
            }
        }
    }

    let mut results: Vec<HybridResult> = merged
        .into_values()
        .map(|mut r| {
            r.combined_score =
                r.semantic_similarity.map(f64::from).unwrap_or(0.0) + r.keyword_score.unwrap_or(0.0);
            r
        })
        .collect();

    results.sort_by(compare_hybrid);
    results.truncate(limit);
    results
}

fn compare_hybrid(a: &HybridResult, b: &HybridResult) -> Ordering {
    let a_both = a.match_type == MatchType::Both;
    let b_both = b.match_type == MatchType::Both;
    b_both
        .cmp(&a_both)
        .then_with(|| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.record_id.cmp(&b.record_id))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Keyword plus semantic retrieval over the knowledge records.
///
/// When no provider is configured, the semantic channel is skipped.
pub struct HybridSearchEngine {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<EmbeddingStore>,
    records: Arc<dyn RecordSource>,
    keyword: Arc<dyn KeywordSearch>,
    config: SearchConfig,
}

impl HybridSearchEngine {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        store: Arc<EmbeddingStore>,
        records: Arc<dyn RecordSource>,
        keyword: Arc<dyn KeywordSearch>,
        config: SearchConfig,
    ) -> Self {
        Self {
            provider,
            store,
            records,
            keyword,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Semantic-only search: embed `query` once and rank every kind in `kinds`
    /// (all kinds when empty).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no provider is configured and
    /// `AppError::Embedding` when embedding the query fails.
    pub async fn semantic_search(
        &self,
        query: &str,
        kinds: &[RecordKind],
        limit: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<SemanticSearchResult>> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| AppError::config("no embedding provider configured"))?;

        let query_vector = provider.embed(query).await?;
        collect_semantic_matches(
            &self.store,
            self.records.as_ref(),
            &query_vector,
            effective_kinds(kinds),
            limit,
            min_similarity,
        )
    }

    /// Keyword and semantic search merged into one ranked list.
    ///
    /// Semantic matches use the configured `min_similarity`. Keyword search
    /// errors are returned; semantic channel errors only degrade the outcome.
    pub async fn hybrid_search(
        &self,
        query: &str,
        kinds: &[RecordKind],
        limit: usize,
    ) -> AppResult<HybridSearchOutcome> {
        let kinds = effective_kinds(kinds);

        let mut keyword_hits = Vec::new();
        for &kind in kinds {
            keyword_hits.extend(self.keyword.search(kind, query, limit)?);
        }

        let mut semantic_degraded = false;
        let mut semantic_error = None;
        let semantic_hits = match self.provider {
            Some(_) => match self
                .semantic_search(query, kinds, limit, self.config.min_similarity)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "search: semantic channel failed, using keyword results only");
                    semantic_degraded = true;
                    semantic_error = Some(e.to_string());
                    Vec::new()
                }
            },
            None => {
                semantic_degraded = true;
                semantic_error = Some("no embedding provider configured".to_string());
                Vec::new()
            }
        };

        debug!(
            keyword = keyword_hits.len(),
            semantic = semantic_hits.len(),
            "search: merging channels"
        );

        Ok(HybridSearchOutcome {
            results: merge_results(keyword_hits, semantic_hits, limit),
            semantic_degraded,
            semantic_error,
            provider_display: self
                .provider
                .as_ref()
                .map(|p| p.display_name().to_string()),
        })
    }
}

fn effective_kinds(kinds: &[RecordKind]) -> &[RecordKind] {
    if kinds.is_empty() {
        RecordKind::all()
    } else {
        kinds
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
