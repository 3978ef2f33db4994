//! Ollama Embedding Provider
//!
//! Local-model backend built on the `ollama-rs` SDK. Requires a running
//! Ollama server but no API key.
//!
//! Uses `nomic-embed-text` (768-dimensional) by default. The dimension is
//! detected after the first successful embedding call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use super::provider::{EmbeddingBackend, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::models::config::EmbeddingConfig;
use crate::utils::error::{AppError, AppResult};

/// Default Ollama API endpoint.
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Default dimension for nomic-embed-text.
const DEFAULT_DIMENSION: usize = 768;

/// Ollama embedding provider.
pub struct OllamaEmbeddingProvider {
    client: Ollama,
    model: String,
    /// Updated after each successful call; atomic so `&self` methods can write it.
    dimension: AtomicUsize,
    display_name: String,
    base_url: String,
}

impl OllamaEmbeddingProvider {
    /// Build a provider from the embedding config section.
    ///
    /// Fails with a configuration error if the endpoint URL cannot be parsed.
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let model = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let base_url = config
            .endpoint_url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();

        let client = Self::create_client(&base_url, config.timeout_secs)?;
        let display_name = format!("Ollama ({})", model);

        Ok(Self {
            client,
            model,
            dimension: AtomicUsize::new(DEFAULT_DIMENSION),
            display_name,
            base_url,
        })
    }

    /// Create an Ollama SDK client whose HTTP requests are bounded by `timeout_secs`.
    fn create_client(base_url: &str, timeout_secs: u64) -> AppResult<Ollama> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            AppError::config(format!("invalid Ollama endpoint '{}': {}", base_url, e))
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::config(format!("Ollama endpoint '{}' has no host", base_url)))?;
        let port = parsed.port().unwrap_or(11434);
        let host_url = format!("{}://{}", parsed.scheme(), host);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Ollama::new_with_client(host_url, port, http_client))
    }

    /// Map an ollama-rs error to our `EmbeddingError` type.
    fn map_ollama_error(&self, err: ollama_rs::error::OllamaError) -> EmbeddingError {
        let msg = err.to_string();

        if msg.contains("connect") || msg.contains("Connection refused") {
            EmbeddingError::ProviderUnavailable {
                message: format!(
                    "Cannot connect to Ollama at {}. Is the Ollama server running? \
                     Start it with: ollama serve",
                    self.base_url
                ),
            }
        } else if msg.contains("timed out") || msg.contains("timeout") {
            EmbeddingError::NetworkError {
                message: format!("Request to Ollama at {} timed out", self.base_url),
            }
        } else if msg.contains("not found") || msg.contains("404") {
            EmbeddingError::ModelNotFound {
                model: self.model.clone(),
            }
        } else {
            EmbeddingError::NetworkError { message: msg }
        }
    }

    /// Update the stored dimension from a successful embedding response.
    fn update_dimension(&self, embedding: &[f32]) {
        if !embedding.is_empty() {
            self.dimension.store(embedding.len(), Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::from(text));

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| self.map_ollama_error(e))?;

        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ParseError {
                message: "Ollama returned no embeddings".to_string(),
            })?;

        self.update_dimension(&embedding);
        Ok(embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.map_ollama_error(e))?;

        let model_base = self.model.split(':').next().unwrap_or(&self.model);
        let model_available = models.iter().any(|m| {
            let local_base = m.name.split(':').next().unwrap_or(&m.name);
            local_base == model_base || m.name == self.model
        });

        if !model_available {
            return Err(EmbeddingError::ModelNotFound {
                model: format!(
                    "'{}' is not available locally. Pull it with: ollama pull {}",
                    self.model, self.model
                ),
            });
        }

        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }

    fn backend(&self) -> EmbeddingBackend {
        EmbeddingBackend::Local
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
