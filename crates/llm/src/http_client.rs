//! HTTP Client Factory
//!
//! Builds the reqwest client shared by a provider's requests.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with a per-request timeout.
///
/// A `timeout_secs` of zero leaves requests unbounded; callers that need a
/// deadline wrap the call in their own timeout instead.
pub fn build_http_client(timeout_secs: u64) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
