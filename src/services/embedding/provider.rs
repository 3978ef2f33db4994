//! Embedding Provider Abstraction
//!
//! Defines the async `EmbeddingProvider` trait and the closed set of
//! backends that implement it. Embedding is kept separate from chat
//! completion: providers here only turn text into vectors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::AppError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingError {
    /// Authentication failed (invalid or missing API key).
    AuthenticationFailed { message: String },

    /// The requested model was not found or is not available.
    ModelNotFound { model: String },

    /// The provider is not reachable or not running.
    ProviderUnavailable { message: String },

    /// The input text exceeds the provider's maximum token/character limit.
    InputTooLong { message: String },

    /// A network or connection error occurred.
    NetworkError { message: String },

    /// The provider returned an unexpected or unparseable response.
    ParseError { message: String },

    /// The provider returned an HTTP error.
    ServerError {
        message: String,
        status: Option<u16>,
    },

    /// Rate limit exceeded.
    RateLimited {
        message: String,
        retry_after: Option<u32>,
    },

    /// Configuration is invalid or incomplete.
    InvalidConfig { message: String },

    /// Any other error.
    Other { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => {
                write!(f, "authentication failed: {}", message)
            }
            Self::ModelNotFound { model } => write!(f, "model not found: {}", model),
            Self::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {}", message)
            }
            Self::InputTooLong { message } => write!(f, "input too long: {}", message),
            Self::NetworkError { message } => write!(f, "network error: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::ServerError { message, status } => {
                if let Some(code) = status {
                    write!(f, "server error (HTTP {}): {}", code, message)
                } else {
                    write!(f, "server error: {}", message)
                }
            }
            Self::RateLimited { message, .. } => write!(f, "rate limited: {}", message),
            Self::InvalidConfig { message } => write!(f, "invalid config: {}", message),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl EmbeddingError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::NetworkError { .. }
                | EmbeddingError::RateLimited { .. }
                | EmbeddingError::ServerError { .. }
                | EmbeddingError::ProviderUnavailable { .. }
        )
    }

    /// For rate-limited errors, return the suggested wait time in seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        if let EmbeddingError::RateLimited { retry_after, .. } = self {
            retry_after.map(|s| s as u64)
        } else {
            None
        }
    }
}

/// Convenience alias for embedding operation results.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Identifies the embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// No provider; search and contradiction detection run keyword-only.
    Disabled,
    /// Ollama model server on the local machine.
    Local,
    /// OpenAI-compatible embeddings API.
    Hosted,
}

impl EmbeddingBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Local => "local",
            Self::Hosted => "hosted",
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "" => Ok(Self::Disabled),
            "local" | "ollama" => Ok(Self::Local),
            "hosted" | "openai" => Ok(Self::Hosted),
            other => Err(AppError::config(format!(
                "unknown embedding backend '{}': expected disabled, local, or hosted",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Embedding provider trait
// ---------------------------------------------------------------------------

/// Async trait for embedding providers.
///
/// Implementations produce dense vector representations of text. The trait
/// is object-safe and `Send + Sync` so one provider can be shared by the
/// pipeline workers and the search paths.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a dense vector.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Model identifier recorded next to every stored vector.
    fn model(&self) -> &str;

    /// Dimensionality of produced vectors.
    ///
    /// Local models report their default until the first successful call
    /// reveals the real value.
    fn dimension(&self) -> usize;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> EmbeddingResult<()>;

    /// Returns whether this provider runs on the local machine.
    fn is_local(&self) -> bool;

    /// Returns the backend this provider implements.
    fn backend(&self) -> EmbeddingBackend;

    /// Returns a human-readable name for this provider instance.
    fn display_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
