//! Contradiction Candidate Finder
//!
//! Produces the bounded set of records a new statement is checked against.
//! Semantic retrieval is preferred; keyword search is the fallback when no
//! provider is configured, embedding fails, or the semantic scan finds
//! nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use knowledge_engine_core::{KeywordSearch, RecordKind, RecordSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::config::ContradictionConfig;
use crate::services::embedding::provider::EmbeddingProvider;
use crate::services::embedding::similarity::find_similar_embeddings;
use crate::services::embedding::store::EmbeddingStore;
use crate::utils::error::AppResult;

// ============================================================================
// Options
// ============================================================================

/// Candidate selection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContradictionOptions {
    pub use_embeddings: bool,
    pub min_similarity: f32,
    pub max_candidates: usize,
    pub include_ideas: bool,
    pub include_decisions: bool,
    /// Off by default; learnings rarely conflict with each other.
    pub include_learnings: bool,
}

impl Default for ContradictionOptions {
    fn default() -> Self {
        Self {
            use_embeddings: true,
            min_similarity: 0.6,
            max_candidates: 20,
            include_ideas: true,
            include_decisions: true,
            include_learnings: false,
        }
    }
}

impl From<&ContradictionConfig> for ContradictionOptions {
    fn from(config: &ContradictionConfig) -> Self {
        Self {
            use_embeddings: config.use_embeddings,
            min_similarity: config.min_similarity,
            max_candidates: config.max_candidates,
            include_ideas: config.include_ideas,
            include_decisions: config.include_decisions,
            include_learnings: config.include_learnings,
        }
    }
}

impl ContradictionOptions {
    /// Kinds to search, in idea, decision, learning order.
    pub fn enabled_kinds(&self) -> Vec<RecordKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.include_ideas {
            kinds.push(RecordKind::Idea);
        }
        if self.include_decisions {
            kinds.push(RecordKind::Decision);
        }
        if self.include_learnings {
            kinds.push(RecordKind::Learning);
        }
        kinds
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// Which retrieval path produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Semantic,
    Keyword,
}

/// A record that may contradict the statement being checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionCandidate {
    pub id: String,
    pub kind: RecordKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    pub source: CandidateSource,
}

// ============================================================================
// CandidateFinder
// ============================================================================

pub struct CandidateFinder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<EmbeddingStore>,
    records: Arc<dyn RecordSource>,
    keyword: Arc<dyn KeywordSearch>,
}

impl CandidateFinder {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        store: Arc<EmbeddingStore>,
        records: Arc<dyn RecordSource>,
        keyword: Arc<dyn KeywordSearch>,
    ) -> Self {
        Self {
            provider,
            store,
            records,
            keyword,
        }
    }

    /// Records worth checking `content` against, at most
    /// `options.max_candidates` of them.
    ///
    /// `exclude_id` names the record being checked; it is dropped from both
    /// retrieval paths before the cap applies, so its own vector never
    /// suppresses the keyword fallback.
    ///
    /// A provider error is logged and answered from keyword search instead.
    /// Store, record source, and keyword search errors are returned.
    pub async fn find_potential_contradictions(
        &self,
        content: &str,
        exclude_id: Option<&str>,
        options: &ContradictionOptions,
    ) -> AppResult<Vec<ContradictionCandidate>> {
        let kinds = options.enabled_kinds();
        if kinds.is_empty() || options.max_candidates == 0 {
            return Ok(Vec::new());
        }

        if options.use_embeddings {
            if let Some(provider) = &self.provider {
                match provider.embed(content).await {
                    Ok(vector) => {
                        let candidates =
                            self.semantic_candidates(&vector, &kinds, exclude_id, options)?;
                        if !candidates.is_empty() {
                            return Ok(candidates);
                        }
                        debug!("contradiction: no semantic candidates, trying keyword search");
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            "contradiction: embedding failed, falling back to keyword search"
                        );
                    }
                }
            }
        }

        self.keyword_candidates(content, &kinds, exclude_id, options)
    }

    fn semantic_candidates(
        &self,
        vector: &[f32],
        kinds: &[RecordKind],
        exclude_id: Option<&str>,
        options: &ContradictionOptions,
    ) -> AppResult<Vec<ContradictionCandidate>> {
        let mut candidates = Vec::new();
        let fetch = fetch_limit(options.max_candidates, exclude_id);

        for &kind in kinds {
            let hits = find_similar_embeddings(
                &self.store,
                vector,
                kind,
                fetch,
                options.min_similarity,
            )?;
            for hit in hits {
                if Some(hit.record_id.as_str()) == exclude_id {
                    continue;
                }
                let Some(record) = self.records.get_record_content(&hit.record_id, kind)? else {
                    continue;
                };
                candidates.push(ContradictionCandidate {
                    id: hit.record_id,
                    kind,
                    content: record.content,
                    created_at: record.created_at,
                    similarity: Some(hit.similarity),
                    keyword_score: None,
                    source: CandidateSource::Semantic,
                });
            }
        }

        candidates.truncate(options.max_candidates);
        Ok(candidates)
    }

    fn keyword_candidates(
        &self,
        content: &str,
        kinds: &[RecordKind],
        exclude_id: Option<&str>,
        options: &ContradictionOptions,
    ) -> AppResult<Vec<ContradictionCandidate>> {
        let mut candidates = Vec::new();
        let fetch = fetch_limit(options.max_candidates, exclude_id);

        for &kind in kinds {
            for hit in self.keyword.search(kind, content, fetch)? {
                if Some(hit.id.as_str()) == exclude_id {
                    continue;
                }
                candidates.push(ContradictionCandidate {
                    id: hit.id,
                    kind: hit.kind,
                    content: hit.content,
                    created_at: hit.created_at,
                    similarity: None,
                    keyword_score: Some(hit.score),
                    source: CandidateSource::Keyword,
                });
            }
        }

        candidates.truncate(options.max_candidates);
        Ok(candidates)
    }
}

/// One extra slot per kind when the checked record may occupy one.
fn fetch_limit(max_candidates: usize, exclude_id: Option<&str>) -> usize {
    if exclude_id.is_some() {
        max_candidates.saturating_add(1)
    } else {
        max_candidates
    }
}
