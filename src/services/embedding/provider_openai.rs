//! OpenAI Embedding Provider
//!
//! Hosted backend for OpenAI's embeddings API over reqwest. Works with any
//! OpenAI-compatible endpoint (Azure OpenAI, vLLM, LiteLLM) through
//! `endpoint_url`.
//!
//! - Endpoint: `POST https://api.openai.com/v1/embeddings`
//! - Auth: `Authorization: Bearer {api_key}`
//! - Body: `{ model, input }`
//! - Response: `{ data: [{ embedding, index }], model, usage }`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{EmbeddingBackend, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::models::config::EmbeddingConfig;
use crate::utils::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI embedding API endpoint.
pub const OPENAI_EMBEDDING_API_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Dimension of text-embedding-3-small, reported until a response says otherwise.
const DEFAULT_DIMENSION: usize = 1536;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: Option<OpenAIErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Key resolution
// ---------------------------------------------------------------------------

/// Pick the API key: explicit config first, then the environment value.
///
/// Blank strings count as absent. Returns a configuration error when
/// neither source yields a key.
pub fn resolve_api_key(explicit: Option<&str>, env_value: Option<String>) -> AppResult<String> {
    explicit
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| {
            env_value
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
        .ok_or_else(|| {
            AppError::config(format!(
                "hosted embedding backend requires an API key: set embedding.api_key or {}",
                API_KEY_ENV_VAR
            ))
        })
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// OpenAI embedding provider.
///
/// The reqwest `Client` is internally reference counted and every field is
/// immutable after construction.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: AtomicUsize,
    display_name: String,
}

impl OpenAIEmbeddingProvider {
    /// Build a provider, resolving the API key from config or `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            std::env::var(API_KEY_ENV_VAR).ok(),
        )?;
        Self::with_api_key(config, api_key)
    }

    /// Build a provider with an already resolved key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> AppResult<Self> {
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
            .unwrap_or(OPENAI_EMBEDDING_API_URL)
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;

        let display_name = format!("OpenAI ({})", model);

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            dimension: AtomicUsize::new(DEFAULT_DIMENSION),
            display_name,
        })
    }

    fn build_request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": text,
        })
    }

    /// Send a POST request to the embedding API and parse the response.
    async fn post_embeddings(
        &self,
        body: &serde_json::Value,
    ) -> EmbeddingResult<OpenAIEmbeddingResponse> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();

        if status == 200 {
            let resp_text = response
                .text()
                .await
                .map_err(|e| EmbeddingError::NetworkError {
                    message: format!("failed to read response body: {}", e),
                })?;

            serde_json::from_str::<OpenAIEmbeddingResponse>(&resp_text).map_err(|e| {
                EmbeddingError::ParseError {
                    message: format!("failed to parse embedding response: {}", e),
                }
            })
        } else {
            let body_text = response.text().await.unwrap_or_default();
            Err(self.map_http_error(status, &body_text))
        }
    }

    /// Map a reqwest transport error to `EmbeddingError`.
    fn map_reqwest_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_connect() {
            EmbeddingError::ProviderUnavailable {
                message: format!(
                    "Cannot connect to embedding API at {}. Check your network connectivity.",
                    self.base_url
                ),
            }
        } else if err.is_timeout() {
            EmbeddingError::NetworkError {
                message: format!("Request to embedding API timed out: {}", err),
            }
        } else {
            EmbeddingError::NetworkError {
                message: err.to_string(),
            }
        }
    }

    /// Map an HTTP error response to `EmbeddingError`.
    fn map_http_error(&self, status: u16, body_text: &str) -> EmbeddingError {
        let error_message = serde_json::from_str::<OpenAIErrorResponse>(body_text)
            .ok()
            .and_then(|r| r.error)
            .and_then(|d| d.message)
            .unwrap_or_else(|| body_text.to_string());

        match status {
            401 => EmbeddingError::AuthenticationFailed {
                message: format!("embedding API rejected the key: {}", error_message),
            },
            429 => EmbeddingError::RateLimited {
                message: error_message,
                retry_after: None,
            },
            400 => {
                if error_message.contains("token") || error_message.contains("length") {
                    EmbeddingError::InputTooLong {
                        message: error_message,
                    }
                } else {
                    EmbeddingError::InvalidConfig {
                        message: format!("bad request: {}", error_message),
                    }
                }
            }
            404 => EmbeddingError::ModelNotFound {
                model: format!("'{}' not found at {}", self.model, self.base_url),
            },
            _ => EmbeddingError::ServerError {
                message: error_message,
                status: Some(status),
            },
        }
    }

    /// Pull the single vector out of a response.
    fn extract_embedding(mut response: OpenAIEmbeddingResponse) -> EmbeddingResult<Vec<f32>> {
        response.data.sort_by_key(|d| d.index);
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::ParseError {
                message: "embedding API returned no data".to_string(),
            })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let body = self.build_request_body(text);
        let response = self.post_embeddings(&body).await?;
        let embedding = Self::extract_embedding(response)?;
        if !embedding.is_empty() {
            self.dimension.store(embedding.len(), Ordering::Relaxed);
        }
        Ok(embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        self.embed("health check").await.map(|_| ())
    }

    fn is_local(&self) -> bool {
        false
    }

    fn backend(&self) -> EmbeddingBackend {
        EmbeddingBackend::Hosted
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
