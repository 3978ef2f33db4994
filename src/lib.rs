//! Knowledge Engine - Rust Library
//!
//! Semantic retrieval and contradiction detection for a local knowledge
//! store of ideas, decisions, and learnings.
//! It includes:
//! - Embedding providers, the vector store, and the enrichment pipeline
//! - Cosine similarity, semantic search, and keyword/semantic hybrid search
//! - Contradiction candidate finding, pairwise analyzers, and auto-linking
//! - Storage layer (SQLite pool, reference record store, config files)
//! - The `KnowledgeEngine` facade that wires everything from one config

pub mod engine;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use engine::{build_analyzer, Collaborators, KnowledgeEngine};
pub use knowledge_engine_core::{
    CoreError, CoreResult, KeywordHit, KeywordSearch, LinkDirection, LinkStore, LinkedRecord,
    PendingRecord, RecordContent, RecordKind, RecordSource, RELATION_CONTRADICTS,
};
pub use models::config::{
    AnalyzerKind, ContradictionConfig, EmbeddingConfig, EngineConfig, PipelineConfig,
    SearchConfig,
};
pub use services::contradiction::{
    AutoCheckOutcome, AutoLinkPolicy, ContradictionAnalyzer, ContradictionCandidate,
    ContradictionFinding, ContradictionOptions, ContradictionResult, ContradictionType,
    HeuristicAnalyzer, LlmContradictionAnalyzer, RecordForAnalysis,
};
pub use services::embedding::{
    cosine_similarity, EmbeddingBackend, EmbeddingError, EmbeddingProvider, EmbeddingStats,
    EmbeddingStore, EnrichmentPipeline, PipelineStats, SimilarityResult,
};
pub use services::search::{HybridResult, HybridSearchOutcome, MatchType, SemanticSearchResult};
pub use storage::{ConfigService, Database, SqliteRecordStore};
pub use utils::error::{AppError, AppResult};
