//! Contradiction Analyzer
//!
//! Pairwise judges deciding whether two statements conflict. The engine
//! picks one implementation at construction:
//!
//! - [`HeuristicAnalyzer`]: never decides; every pair comes back
//!   inconclusive.
//! - [`LlmContradictionAnalyzer`](super::analyzer_llm::LlmContradictionAnalyzer):
//!   asks a chat model for a structured verdict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use knowledge_engine_core::RecordKind;
use serde::{Deserialize, Serialize};

use super::candidates::ContradictionCandidate;
use crate::utils::error::AppResult;

// ============================================================================
// Types
// ============================================================================

/// A statement handed to an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordForAnalysis {
    pub id: String,
    pub kind: RecordKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ContradictionCandidate> for RecordForAnalysis {
    fn from(candidate: &ContradictionCandidate) -> Self {
        Self {
            id: candidate.id.clone(),
            kind: candidate.kind,
            content: candidate.content.clone(),
            created_at: Some(candidate.created_at),
        }
    }
}

/// How two statements conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContradictionType {
    /// One statement negates the other.
    Direct,
    /// Following both at once is impossible.
    Implicit,
    /// The later statement supersedes the earlier one.
    Temporal,
    #[default]
    None,
}

/// Verdict for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionResult {
    pub is_contradiction: bool,
    /// Within `[0, 1]`.
    pub confidence: f32,
    pub explanation: String,
    pub contradiction_type: ContradictionType,
}

/// A candidate together with its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionFinding {
    pub candidate: RecordForAnalysis,
    pub result: ContradictionResult,
}

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait ContradictionAnalyzer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Judge a single pair.
    async fn analyze_contradiction(
        &self,
        r1: &RecordForAnalysis,
        r2: &RecordForAnalysis,
    ) -> AppResult<ContradictionResult>;

    /// Judge `record` against each candidate.
    ///
    /// Candidates sharing `record.id` are never judged or returned. Which of
    /// the remaining verdicts are returned depends on the analyzer.
    async fn find_contradictions(
        &self,
        record: &RecordForAnalysis,
        candidates: &[RecordForAnalysis],
    ) -> AppResult<Vec<ContradictionFinding>>;
}

// ============================================================================
// HeuristicAnalyzer
// ============================================================================

pub const HEURISTIC_CONFIDENCE: f32 = 0.5;

/// Analyzer that cannot tell statements apart and says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn inconclusive() -> ContradictionResult {
        ContradictionResult {
            is_contradiction: false,
            confidence: HEURISTIC_CONFIDENCE,
            explanation: "Heuristic check is inconclusive; deeper analysis is required to \
                          decide whether these statements conflict."
                .to_string(),
            contradiction_type: ContradictionType::None,
        }
    }
}

#[async_trait]
impl ContradictionAnalyzer for HeuristicAnalyzer {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn analyze_contradiction(
        &self,
        _r1: &RecordForAnalysis,
        _r2: &RecordForAnalysis,
    ) -> AppResult<ContradictionResult> {
        Ok(Self::inconclusive())
    }

    /// One inconclusive finding per non-self candidate.
    async fn find_contradictions(
        &self,
        record: &RecordForAnalysis,
        candidates: &[RecordForAnalysis],
    ) -> AppResult<Vec<ContradictionFinding>> {
        Ok(candidates
            .iter()
            .filter(|c| c.id != record.id)
            .map(|c| ContradictionFinding {
                candidate: c.clone(),
                result: Self::inconclusive(),
            })
            .collect())
    }
}
