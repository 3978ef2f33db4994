//! Provider Factory
//!
//! Turns the `embedding` config section into a shared provider handle.

use std::sync::Arc;

use tracing::info;

use super::provider::{EmbeddingBackend, EmbeddingProvider};
use super::provider_ollama::OllamaEmbeddingProvider;
use super::provider_openai::OpenAIEmbeddingProvider;
use crate::models::config::EmbeddingConfig;
use crate::utils::error::AppResult;

/// Build the configured embedding provider.
///
/// Returns `Ok(None)` for the disabled backend; callers then run in
/// keyword-only mode.
///
/// # Errors
///
/// Returns `AppError::Config` for an unknown backend name, an unparseable
/// endpoint, or a hosted backend with no resolvable API key.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
    let backend: EmbeddingBackend = config.backend.parse()?;

    let provider: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Disabled => {
            info!("embedding: backend disabled, semantic features off");
            return Ok(None);
        }
        EmbeddingBackend::Local => Arc::new(OllamaEmbeddingProvider::new(config)?),
        EmbeddingBackend::Hosted => Arc::new(OpenAIEmbeddingProvider::new(config)?),
    };

    info!(
        backend = %backend,
        provider = provider.display_name(),
        "embedding: provider ready"
    );
    Ok(Some(provider))
}
