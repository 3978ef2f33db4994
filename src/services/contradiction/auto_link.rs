//! Auto-Link Orchestrator
//!
//! Checks a freshly written record against its candidates and records
//! confirmed contradictions as `contradicts` links. The candidate's kind is
//! carried through from retrieval, so link targets never depend on id
//! prefixes.

use std::sync::Arc;

use chrono::Utc;
use knowledge_engine_core::{LinkStore, LinkedRecord, RecordKind, RecordSource, RELATION_CONTRADICTS};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::analyzer::{ContradictionAnalyzer, ContradictionFinding, RecordForAnalysis};
use super::candidates::{CandidateFinder, ContradictionOptions};
use crate::models::config::ContradictionConfig;
use crate::utils::error::AppResult;

/// When a finding becomes a link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoLinkPolicy {
    pub enabled: bool,
    pub min_confidence: f32,
}

impl Default for AutoLinkPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.7,
        }
    }
}

impl From<&ContradictionConfig> for AutoLinkPolicy {
    fn from(config: &ContradictionConfig) -> Self {
        Self {
            enabled: config.auto_link,
            min_confidence: config.min_confidence,
        }
    }
}

impl AutoLinkPolicy {
    /// A finding is linked only when flagged and confident enough.
    pub fn should_link(&self, finding: &ContradictionFinding) -> bool {
        self.enabled
            && finding.result.is_contradiction
            && finding.result.confidence >= self.min_confidence
    }
}

/// Result of one auto-check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoCheckOutcome {
    /// Candidates handed to the analyzer, self excluded.
    pub candidates_considered: usize,
    pub findings: Vec<ContradictionFinding>,
    /// Targets of the links written by this check.
    pub linked_ids: Vec<String>,
}

pub struct AutoLinker {
    finder: Arc<CandidateFinder>,
    records: Arc<dyn RecordSource>,
    links: Arc<dyn LinkStore>,
}

impl AutoLinker {
    pub fn new(
        finder: Arc<CandidateFinder>,
        records: Arc<dyn RecordSource>,
        links: Arc<dyn LinkStore>,
    ) -> Self {
        Self {
            finder,
            records,
            links,
        }
    }

    /// Find candidates for `content`, analyze them, and link confirmed
    /// contradictions from `record_id` to each target.
    ///
    /// The record itself is never a candidate. A failing link write is logged
    /// and the remaining findings are still processed.
    pub async fn auto_check_contradictions(
        &self,
        record_id: &str,
        kind: RecordKind,
        content: &str,
        analyzer: &dyn ContradictionAnalyzer,
        options: &ContradictionOptions,
        policy: AutoLinkPolicy,
    ) -> AppResult<AutoCheckOutcome> {
        let created_at = self
            .records
            .get_record_content(record_id, kind)?
            .map(|r| r.created_at)
            .unwrap_or_else(Utc::now);

        let record = RecordForAnalysis {
            id: record_id.to_string(),
            kind,
            content: content.to_string(),
            created_at: Some(created_at),
        };

        let candidates: Vec<RecordForAnalysis> = self
            .finder
            .find_potential_contradictions(content, Some(record_id), options)
            .await?
            .iter()
            .map(RecordForAnalysis::from)
            .collect();

        if candidates.is_empty() {
            return Ok(AutoCheckOutcome::default());
        }

        let findings = analyzer.find_contradictions(&record, &candidates).await?;

        let mut linked_ids = Vec::new();
        for finding in findings.iter().filter(|f| policy.should_link(f)) {
            let target = &finding.candidate;
            match self.links.add_link(
                record_id,
                kind,
                &target.id,
                target.kind,
                RELATION_CONTRADICTS,
            ) {
                Ok(()) => linked_ids.push(target.id.clone()),
                Err(e) => {
                    warn!(
                        record_id,
                        target_id = %target.id,
                        error = %e,
                        "contradiction: failed to write link, skipping"
                    );
                }
            }
        }

        if !linked_ids.is_empty() {
            info!(
                record_id,
                analyzer = analyzer.name(),
                links = linked_ids.len(),
                "contradiction: linked contradicting records"
            );
        }

        Ok(AutoCheckOutcome {
            candidates_considered: candidates.len(),
            findings,
            linked_ids,
        })
    }

    /// Records joined to `record_id` by a `contradicts` link, either direction.
    pub fn get_contradicting_records(&self, record_id: &str) -> AppResult<Vec<LinkedRecord>> {
        Ok(self.links.linked_records(record_id, RELATION_CONTRADICTS)?)
    }
}
