//! Embedding provider trait and factory.

use super::providers::{hashing::HashingProvider, ollama::OllamaProvider};
use delve_core::config::EmbeddingSettings;
use delve_core::{AppError, AppResult, RetrievalError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "hash", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().ok_or_else(|| {
            RetrievalError::EmbeddingServiceUnavailable("no embedding returned".to_string()).into()
        })
    }
}

/// Create an embedding provider based on configuration.
pub fn create_provider(
    settings: &EmbeddingSettings,
    retry: RetryPolicy,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "hash" => Ok(Arc::new(HashingProvider::new(settings.dimensions))),

        "ollama" => {
            let mut provider = OllamaProvider::new(
                settings.model.clone(),
                settings.dimensions,
                Duration::from_secs(settings.timeout_secs),
                retry,
            )?;
            if let Some(endpoint) = &settings.endpoint {
                provider = provider.with_base_url(endpoint.clone());
            }
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: hash, ollama",
            settings.provider
        ))),
    }
}
