//! Model-Backed Contradiction Analyzer
//!
//! Sends each pair of statements to a chat model and parses a strict JSON
//! verdict:
//!
//! ```json
//! {"isContradiction": true, "confidence": 0.9, "type": "direct", "explanation": "..."}
//! ```
//!
//! Every call is bounded by a timeout. In `find_contradictions` a failing
//! pair is logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use knowledge_engine_llm::{LlmError, LlmProvider, LlmRequestOptions, Message};
use serde::Deserialize;
use tracing::{debug, warn};

use super::analyzer::{
    ContradictionAnalyzer, ContradictionFinding, ContradictionResult, ContradictionType,
    RecordForAnalysis,
};
use crate::utils::error::{AppError, AppResult};

/// Default bound on one pairwise judgement.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You review a team's knowledge base for conflicting statements. \
Reply with a single JSON object and nothing else.";

/// Verdict as the model writes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    is_contradiction: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(rename = "type", default)]
    contradiction_type: ContradictionType,
    #[serde(default)]
    explanation: String,
}

pub struct LlmContradictionAnalyzer {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmContradictionAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the user prompt for one pair.
    pub fn build_prompt(r1: &RecordForAnalysis, r2: &RecordForAnalysis) -> String {
        format!(
            r#"Decide whether the two statements below contradict each other.

## Statement A ({kind_a}, created {date_a})
{content_a}

## Statement B ({kind_b}, created {date_b})
{content_b}

---

Return a JSON object:
{{
  "isContradiction": true|false,
  "confidence": 0.0-1.0,
  "type": "direct|implicit|temporal|none",
  "explanation": "one or two sentences"
}}

Rules:
- "direct": one statement negates the other
- "implicit": both cannot be followed at the same time
- "temporal": the newer statement replaces the older one
- "none": no conflict; set isContradiction to false
- Statements about different topics never contradict"#,
            kind_a = r1.kind,
            date_a = format_created(r1),
            content_a = r1.content,
            kind_b = r2.kind,
            date_b = format_created(r2),
            content_b = r2.content,
        )
    }

    /// Parse the model's reply into a verdict.
    ///
    /// Tolerates markdown code fences and prose around the JSON object.
    /// Confidence is clamped to `[0, 1]`.
    pub fn parse_response(response: &str) -> AppResult<ContradictionResult> {
        let trimmed = response.trim();
        let unfenced = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        let unfenced = unfenced.strip_suffix("```").unwrap_or(unfenced).trim();

        let json_str = match (unfenced.find('{'), unfenced.rfind('}')) {
            (Some(start), Some(end)) if start < end => &unfenced[start..=end],
            _ => {
                return Err(AppError::Llm(LlmError::ParseError {
                    message: "no JSON object in analyzer response".to_string(),
                }))
            }
        };

        let raw: RawVerdict = serde_json::from_str(json_str).map_err(|e| {
            AppError::Llm(LlmError::ParseError {
                message: format!("invalid analyzer verdict: {}", e),
            })
        })?;

        let confidence = if raw.confidence.is_nan() {
            0.0
        } else {
            raw.confidence.clamp(0.0, 1.0)
        };

        Ok(ContradictionResult {
            is_contradiction: raw.is_contradiction,
            confidence,
            explanation: raw.explanation,
            contradiction_type: raw.contradiction_type,
        })
    }
}

fn format_created(record: &RecordForAnalysis) -> String {
    record
        .created_at
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl ContradictionAnalyzer for LlmContradictionAnalyzer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn analyze_contradiction(
        &self,
        r1: &RecordForAnalysis,
        r2: &RecordForAnalysis,
    ) -> AppResult<ContradictionResult> {
        let messages = vec![Message::user(Self::build_prompt(r1, r2))];
        let options = LlmRequestOptions {
            json_response: true,
            ..LlmRequestOptions::default()
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.provider
                .send_message(messages, Some(SYSTEM_PROMPT.to_string()), options),
        )
        .await
        .map_err(|_| LlmError::Timeout {
            seconds: self.timeout.as_secs(),
        })??;

        let content = response.content.ok_or_else(|| {
            AppError::Llm(LlmError::ParseError {
                message: "analyzer response had no content".to_string(),
            })
        })?;

        Self::parse_response(&content)
    }

    /// Only pairs the model flags as contradictions are returned.
    async fn find_contradictions(
        &self,
        record: &RecordForAnalysis,
        candidates: &[RecordForAnalysis],
    ) -> AppResult<Vec<ContradictionFinding>> {
        let mut findings = Vec::new();

        for candidate in candidates.iter().filter(|c| c.id != record.id) {
            match self.analyze_contradiction(record, candidate).await {
                Ok(result) if result.is_contradiction => {
                    findings.push(ContradictionFinding {
                        candidate: candidate.clone(),
                        result,
                    });
                }
                Ok(_) => {
                    debug!(candidate_id = %candidate.id, "contradiction: pair judged compatible");
                }
                Err(e) => {
                    warn!(
                        record_id = %record.id,
                        candidate_id = %candidate.id,
                        error = %e,
                        "contradiction: pair analysis failed, skipping"
                    );
                }
            }
        }

        Ok(findings)
    }
}
