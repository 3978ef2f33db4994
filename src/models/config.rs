//! Engine Configuration Models
//!
//! Configuration sections for the embedding provider, the enrichment
//! pipeline, search defaults, and contradiction detection. Every field has a
//! default, so an empty TOML or JSON document is a valid configuration.

use knowledge_engine_llm::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
    pub contradiction: ContradictionConfig,
}

impl EngineConfig {
    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.embedding.validate()?;
        self.pipeline.validate()?;
        self.search.validate()?;
        self.contradiction.validate()?;
        Ok(())
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Embedding provider selection.
///
/// `backend` stays a plain string here; it is parsed into an
/// `EmbeddingBackend` when the provider is built, so an unknown name fails
/// provider construction rather than config loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "disabled", "local", or "hosted"
    pub backend: String,
    /// Model name; each backend has its own default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// API key for the hosted backend; falls back to `OPENAI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "disabled".to_string(),
            model: None,
            endpoint_url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("embedding.timeout_secs must be at least 1".to_string());
        }
        if let Some(url) = &self.endpoint_url {
            url::Url::parse(url)
                .map_err(|e| format!("embedding.endpoint_url is not a valid URL: {}", e))?;
        }
        if matches!(&self.model, Some(m) if m.trim().is_empty()) {
            return Err("embedding.model must not be empty when set".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Enrichment pipeline sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker count, clamped to 1..=4 when the pipeline is built
    pub worker_count: usize,
    /// Pending job capacity
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 100,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("pipeline.queue_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Search
// ============================================================================

/// Search defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum cosine similarity for semantic matches
    pub min_similarity: f32,
    /// Result limit used when the caller does not pass one
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            default_limit: 10,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_similarity("search.min_similarity", self.min_similarity)?;
        if self.default_limit == 0 {
            return Err("search.default_limit must be at least 1".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Contradiction
// ============================================================================

/// Which contradiction analyzer the engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Inconclusive stub; never flags anything
    #[default]
    Heuristic,
    /// Chat-model judge
    Llm,
}

/// Contradiction detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContradictionConfig {
    pub analyzer: AnalyzerKind,
    /// Chat model used when `analyzer = "llm"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<ProviderConfig>,
    /// Seconds allowed for one pairwise judgement
    pub analysis_timeout_secs: u64,
    pub use_embeddings: bool,
    pub min_similarity: f32,
    pub max_candidates: usize,
    pub include_ideas: bool,
    pub include_decisions: bool,
    pub include_learnings: bool,
    /// Write `contradicts` links for confirmed findings
    pub auto_link: bool,
    /// Minimum confidence before a finding is linked
    pub min_confidence: f32,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerKind::Heuristic,
            llm: None,
            analysis_timeout_secs: 60,
            use_embeddings: true,
            min_similarity: 0.6,
            max_candidates: 20,
            include_ideas: true,
            include_decisions: true,
            include_learnings: false,
            auto_link: true,
            min_confidence: 0.7,
        }
    }
}

impl ContradictionConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_similarity("contradiction.min_similarity", self.min_similarity)?;
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "contradiction.min_confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        if self.max_candidates == 0 {
            return Err("contradiction.max_candidates must be at least 1".to_string());
        }
        if self.analysis_timeout_secs == 0 {
            return Err("contradiction.analysis_timeout_secs must be at least 1".to_string());
        }
        if self.analyzer == AnalyzerKind::Llm && self.llm.is_none() {
            return Err("contradiction.analyzer = \"llm\" requires a [contradiction.llm] section".to_string());
        }
        Ok(())
    }
}

fn validate_similarity(field: &str, value: f32) -> Result<(), String> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(format!("{} must be within [-1, 1], got {}", field, value));
    }
    Ok(())
}
