//! Knowledge Engine LLM
//!
//! A small chat-completion interface used by the model-backed contradiction
//! analyzer. One provider ships: any OpenAI-compatible `/chat/completions`
//! endpoint (OpenAI itself, or a local server exposing the same API).

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use types::*;
