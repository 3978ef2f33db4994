//! Knowledge Engine
//!
//! Wires the embedding provider, vector store, enrichment pipeline, search,
//! and contradiction services from one `EngineConfig` and exposes their
//! operations behind a single handle.
//!
//! With the `disabled` backend the engine runs in keyword-only mode: the
//! pipeline is absent, enqueues are ignored, hybrid search reports a degraded
//! semantic channel, and candidate finding uses keyword search.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use knowledge_engine_core::{KeywordSearch, LinkStore, LinkedRecord, RecordKind, RecordSource};
use knowledge_engine_llm::OpenAIProvider;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::config::{AnalyzerKind, ContradictionConfig, EngineConfig};
use crate::services::contradiction::{
    AutoCheckOutcome, AutoLinkPolicy, AutoLinker, CandidateFinder, ContradictionAnalyzer,
    ContradictionCandidate, ContradictionOptions, HeuristicAnalyzer, LlmContradictionAnalyzer,
};
use crate::services::embedding::{
    create_provider, find_similar_embeddings, EmbeddingProvider, EmbeddingStats, EmbeddingStore,
    EnrichmentPipeline, PipelineStats, SimilarityResult,
};
use crate::services::search::{HybridSearchEngine, HybridSearchOutcome, SemanticSearchResult};
use crate::storage::database::Database;
use crate::storage::records::SqliteRecordStore;
use crate::utils::error::{AppError, AppResult};

/// Environment variable consulted when the chat model config has no key.
pub const LLM_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

// ============================================================================
// Collaborators
// ============================================================================

/// The record-owning services the engine reads from and links through.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordSource>,
    pub keyword: Arc<dyn KeywordSearch>,
    pub links: Arc<dyn LinkStore>,
}

impl Collaborators {
    /// Use the reference SQLite store for all three roles.
    pub fn sqlite(store: Arc<SqliteRecordStore>) -> Self {
        Self {
            records: store.clone(),
            keyword: store.clone(),
            links: store,
        }
    }
}

// ============================================================================
// KnowledgeEngine
// ============================================================================

pub struct KnowledgeEngine {
    config: EngineConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<EmbeddingStore>,
    records: Arc<dyn RecordSource>,
    pipeline: Option<EnrichmentPipeline>,
    search: HybridSearchEngine,
    finder: Arc<CandidateFinder>,
    linker: AutoLinker,
    analyzer: Arc<dyn ContradictionAnalyzer>,
}

impl KnowledgeEngine {
    /// Build an engine over `db` with external collaborators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an invalid config and
    /// `AppError::Config` when the embedding backend or the chat model
    /// cannot be constructed.
    pub fn new(config: EngineConfig, db: &Database, collaborators: Collaborators) -> AppResult<Self> {
        config.validate().map_err(AppError::validation)?;

        let provider = create_provider(&config.embedding)?;
        let analyzer = build_analyzer(&config.contradiction)?;
        let store = Arc::new(EmbeddingStore::from_database(db));

        Ok(Self::with_components(
            config,
            provider,
            analyzer,
            store,
            collaborators,
        ))
    }

    /// Build an engine whose collaborators are the reference SQLite store
    /// sharing `db`.
    pub fn open_sqlite(config: EngineConfig, db: &Database) -> AppResult<Self> {
        let records = Arc::new(SqliteRecordStore::from_database(db));
        Self::new(config, db, Collaborators::sqlite(records))
    }

    /// Assemble an engine from prebuilt parts. The config is not validated.
    pub fn with_components(
        config: EngineConfig,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        analyzer: Arc<dyn ContradictionAnalyzer>,
        store: Arc<EmbeddingStore>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            records,
            keyword,
            links,
        } = collaborators;

        let pipeline = provider.as_ref().map(|p| {
            EnrichmentPipeline::new(
                Arc::clone(p),
                Arc::clone(&store),
                Arc::clone(&records),
                &config.pipeline,
            )
        });

        let search = HybridSearchEngine::new(
            provider.clone(),
            Arc::clone(&store),
            Arc::clone(&records),
            Arc::clone(&keyword),
            config.search.clone(),
        );

        let finder = Arc::new(CandidateFinder::new(
            provider.clone(),
            Arc::clone(&store),
            Arc::clone(&records),
            keyword,
        ));
        let linker = AutoLinker::new(Arc::clone(&finder), Arc::clone(&records), links);

        info!(
            provider = provider.as_ref().map(|p| p.display_name()).unwrap_or("none"),
            analyzer = analyzer.name(),
            "engine: initialized"
        );

        Self {
            config,
            provider,
            store,
            records,
            pipeline,
            search,
            finder,
            linker,
            analyzer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.provider.as_ref()
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn analyzer(&self) -> &Arc<dyn ContradictionAnalyzer> {
        &self.analyzer
    }

    pub fn embedding_store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Embedding CRUD
    // ------------------------------------------------------------------------

    pub fn store_embedding(
        &self,
        record_id: &str,
        kind: RecordKind,
        vector: &[f32],
        model: &str,
    ) -> AppResult<()> {
        self.store.store_embedding(record_id, kind, vector, model)
    }

    pub fn get_embedding(&self, record_id: &str) -> AppResult<Option<Vec<f32>>> {
        self.store.get_embedding(record_id)
    }

    pub fn delete_embedding(&self, record_id: &str) -> AppResult<bool> {
        self.store.delete_embedding(record_id)
    }

    pub fn get_all_embeddings(&self, kind: RecordKind) -> AppResult<HashMap<String, Vec<f32>>> {
        self.store.get_all_embeddings(kind)
    }

    pub fn embedding_stats(&self) -> AppResult<EmbeddingStats> {
        self.store.embedding_stats()
    }

    /// Embed `content` now and store the vector, bypassing the queue.
    ///
    /// # Errors
    ///
    /// `AppError::Config` without a provider; provider and store errors are
    /// returned as is.
    pub async fn embed_record(
        &self,
        record_id: &str,
        kind: RecordKind,
        content: &str,
    ) -> AppResult<Vec<f32>> {
        let provider = self.require_provider()?;
        let vector = provider.embed(content).await?;
        self.store
            .store_embedding(record_id, kind, &vector, provider.model())?;
        Ok(vector)
    }

    // ------------------------------------------------------------------------
    // Pipeline control
    // ------------------------------------------------------------------------

    /// Start the enrichment workers. Without a provider this does nothing.
    pub fn start(&self) -> AppResult<()> {
        match &self.pipeline {
            Some(pipeline) => pipeline.start(),
            None => {
                debug!("engine: no embedding provider, pipeline not started");
                Ok(())
            }
        }
    }

    /// Stop the enrichment workers and wait for them to exit.
    pub async fn stop(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.stop().await;
        }
    }

    /// Offer a freshly written record for background embedding.
    pub fn enqueue(
        &self,
        record_id: impl Into<String>,
        kind: RecordKind,
        content: impl Into<String>,
    ) -> bool {
        self.pipeline
            .as_ref()
            .is_some_and(|p| p.enqueue(record_id, kind, content))
    }

    /// Backfill vectors for records that have none. Returns the number
    /// embedded; zero without a provider.
    pub async fn process_pending(
        &self,
        kinds: Option<&[RecordKind]>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        match &self.pipeline {
            Some(pipeline) => pipeline.process_pending(kinds, limit, cancel).await,
            None => Ok(0),
        }
    }

    pub fn queue_size(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.queue_size())
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.is_running())
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline
            .as_ref()
            .map(|p| p.stats())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------------

    pub fn find_similar_embeddings(
        &self,
        query: &[f32],
        kind: RecordKind,
        limit: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<SimilarityResult>> {
        find_similar_embeddings(&self.store, query, kind, limit, min_similarity)
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        kinds: &[RecordKind],
        limit: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<SemanticSearchResult>> {
        self.search
            .semantic_search(query, kinds, limit, min_similarity)
            .await
    }

    /// Hybrid search; `limit` falls back to `search.default_limit`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        kinds: &[RecordKind],
        limit: Option<usize>,
    ) -> AppResult<HybridSearchOutcome> {
        let limit = limit.unwrap_or(self.config.search.default_limit);
        self.search.hybrid_search(query, kinds, limit).await
    }

    // ------------------------------------------------------------------------
    // Contradictions
    // ------------------------------------------------------------------------

    /// Candidate options taken from the `contradiction` config section.
    pub fn contradiction_options(&self) -> ContradictionOptions {
        ContradictionOptions::from(&self.config.contradiction)
    }

    pub async fn find_potential_contradictions(
        &self,
        content: &str,
        exclude_id: Option<&str>,
        options: &ContradictionOptions,
    ) -> AppResult<Vec<ContradictionCandidate>> {
        self.finder
            .find_potential_contradictions(content, exclude_id, options)
            .await
    }

    /// Check a newly written record with the configured analyzer, options,
    /// and link policy.
    pub async fn auto_check_contradictions(
        &self,
        record_id: &str,
        kind: RecordKind,
        content: &str,
    ) -> AppResult<AutoCheckOutcome> {
        self.auto_check_contradictions_with(
            record_id,
            kind,
            content,
            self.analyzer.as_ref(),
            AutoLinkPolicy::from(&self.config.contradiction),
        )
        .await
    }

    /// Same as [`auto_check_contradictions`](Self::auto_check_contradictions)
    /// with a caller-chosen analyzer and link policy.
    pub async fn auto_check_contradictions_with(
        &self,
        record_id: &str,
        kind: RecordKind,
        content: &str,
        analyzer: &dyn ContradictionAnalyzer,
        policy: AutoLinkPolicy,
    ) -> AppResult<AutoCheckOutcome> {
        self.linker
            .auto_check_contradictions(
                record_id,
                kind,
                content,
                analyzer,
                &self.contradiction_options(),
                policy,
            )
            .await
    }

    pub fn get_contradicting_records(&self, record_id: &str) -> AppResult<Vec<LinkedRecord>> {
        self.linker.get_contradicting_records(record_id)
    }

    /// Whether `record_id` of `kind` still exists in the record source.
    pub fn record_exists(&self, record_id: &str, kind: RecordKind) -> AppResult<bool> {
        Ok(self.records.get_record_content(record_id, kind)?.is_some())
    }

    fn require_provider(&self) -> AppResult<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::config("no embedding provider configured"))
    }
}

impl std::fmt::Debug for KnowledgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeEngine")
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.display_name().to_string()),
            )
            .field("analyzer", &self.analyzer.name())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Build the analyzer named by `contradiction.analyzer`.
///
/// The chat model's API key falls back to `OPENAI_API_KEY`.
pub fn build_analyzer(config: &ContradictionConfig) -> AppResult<Arc<dyn ContradictionAnalyzer>> {
    match config.analyzer {
        AnalyzerKind::Heuristic => Ok(Arc::new(HeuristicAnalyzer::new())),
        AnalyzerKind::Llm => {
            let mut llm = config.llm.clone().ok_or_else(|| {
                AppError::config("contradiction.analyzer = \"llm\" requires a [contradiction.llm] section")
            })?;
            if llm.api_key.is_none() {
                llm.api_key = std::env::var(LLM_API_KEY_ENV_VAR)
                    .ok()
                    .filter(|k| !k.trim().is_empty());
            }
            let provider = OpenAIProvider::new(llm)?;
            Ok(Arc::new(
                LlmContradictionAnalyzer::new(Arc::new(provider))
                    .with_timeout(Duration::from_secs(config.analysis_timeout_secs)),
            ))
        }
    }
}
