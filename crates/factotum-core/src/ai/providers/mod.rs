//! Provider adapters
//!
//! Each adapter translates the neutral completion request into one concrete
//! LM HTTP dialect (or a local CLI invocation) and parses the response back.
//! Adapters report availability from their credentials; the router only
//! ever talks to available ones.

mod anthropic;
mod cli;
mod gemini;
mod openai;
mod perplexity;

pub use anthropic::AnthropicProvider;
pub use cli::ClaudeCliProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::ai::types::{Completion, CompletionRequest};
use crate::config::Config;

/// Default timeout for provider HTTP and subprocess calls.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

/// One LM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used in routing rules and audit events.
    fn name(&self) -> &str;

    /// True when credentials are configured and the adapter is not disabled.
    fn available(&self) -> bool;

    /// Model used when the request carries no override.
    fn default_model(&self) -> &str;

    /// Issue one completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Build the default adapter set from configuration, in registration order.
/// Registration order doubles as fallback order after the selected provider.
pub fn default_providers(config: &Config) -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(AnthropicProvider::from_settings(&config.anthropic)),
        Arc::new(OpenAiProvider::from_settings(&config.openai)),
        Arc::new(PerplexityProvider::from_settings(&config.perplexity)),
        Arc::new(GeminiProvider::from_settings(&config.gemini)),
        Arc::new(ClaudeCliProvider::new()),
    ]
}

/// Shared HTTP client with the provider timeout applied.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Surface a non-2xx response as an error carrying status and body.
pub(crate) async fn handle_error_response(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{provider} API error {status}: {body}")
}
