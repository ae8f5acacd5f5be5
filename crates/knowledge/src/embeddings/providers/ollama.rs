//! Ollama Embedding Provider
//!
//! Provides semantic embeddings via Ollama's local API using models like
//! nomic-embed-text.
//!
//! Every request carries a timeout and goes through the shared retry helper.
//! Transport failures surface as `EmbeddingServiceUnavailable`, expired
//! requests as `Timeout`.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use delve_core::{retry_with_backoff, AppError, AppResult, RetrievalError, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

/// Request payload for Ollama embeddings API
#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response from Ollama embeddings API
#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Error response from Ollama API
#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider talking to the default local endpoint.
    ///
    /// No request is made here; an unreachable server shows up on the first
    /// `embed` call.
    pub fn new(
        model: String,
        dimensions: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for Ollama: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model,
            dimensions,
            timeout,
            retry,
        })
    }

    /// Point the provider at another Ollama instance.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Embed single text (no retries)
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|r| r.error)
                .unwrap_or(error_text);

            return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
                "Ollama API error ({}): {}",
                status, message
            ))
            .into());
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            RetrievalError::EmbeddingServiceUnavailable(format!(
                "Failed to parse Ollama response: {}",
                e
            ))
        })?;

        if body.embedding.len() != self.dimensions {
            return Err(AppError::Knowledge(format!(
                "Ollama model '{}' returned {} dimensions, expected {}",
                self.model,
                body.embedding.len(),
                self.dimensions
            )));
        }

        Ok(body.embedding)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            RetrievalError::Timeout {
                operation: "embed".to_string(),
                millis: self.timeout.as_millis() as u64,
            }
            .into()
        } else {
            RetrievalError::EmbeddingServiceUnavailable(format!(
                "Ollama not reachable at {}: {}",
                self.base_url, e
            ))
            .into()
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // Ollama's embeddings endpoint takes one prompt per request
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                warn!("Embedding zero vector for blank text at index {}", i);
                embeddings.push(vec![0.0; self.dimensions]);
                continue;
            }

            let embedding =
                retry_with_backoff(self.retry, "ollama embed", || self.embed_single(text)).await?;
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}
