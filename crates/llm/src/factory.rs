//! LLM provider factory.
//!
//! Creates a generation client from the `llm` section of the application
//! configuration, resolving endpoints and secrets.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use delve_core::config::LlmSettings;
use delve_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client for the configured provider.
///
/// # Arguments
/// * `settings` - The `llm` configuration section
/// * `api_key` - API key (required for OpenAI-compatible providers)
///
/// # Errors
/// Returns error if the provider is unknown, a required secret is missing,
/// or the HTTP client cannot be built.
pub fn create_client(settings: &LlmSettings, api_key: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", settings.provider)))?;

    let endpoint = settings
        .endpoint
        .clone()
        .unwrap_or_else(|| provider.default_endpoint().to_string());
    let timeout = Duration::from_secs(settings.timeout_secs);

    tracing::debug!(
        "Creating {} client (endpoint: {}, model: {})",
        provider.as_str(),
        endpoint,
        settings.model
    );

    match provider {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_timeout(endpoint, timeout)?)),
        ProviderType::OpenAi => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI-compatible provider requires API key".to_string())
            })?;
            Ok(Arc::new(OpenAiClient::new(endpoint, api_key, timeout)?))
        }
    }
}
