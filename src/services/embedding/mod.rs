//! Embedding Subsystem
//!
//! Providers that turn text into vectors, the SQLite vector store, the
//! background enrichment pipeline, and cosine similarity ranking.

pub mod factory;
pub mod pipeline;
pub mod provider;
pub mod provider_ollama;
pub mod provider_openai;
pub mod similarity;
pub mod store;

pub use factory::create_provider;
pub use pipeline::{EnrichmentPipeline, PipelineStats, MAX_WORKERS};
pub use provider::{EmbeddingBackend, EmbeddingError, EmbeddingProvider, EmbeddingResult};
pub use provider_ollama::OllamaEmbeddingProvider;
pub use provider_openai::OpenAIEmbeddingProvider;
pub use similarity::{cosine_similarity, find_similar_embeddings, SimilarityResult};
pub use store::{
    bytes_to_embedding, embedding_to_bytes, EmbeddingRecord, EmbeddingStats, EmbeddingStore,
    ModelUsage,
};
