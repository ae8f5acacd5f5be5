//! Embedding identity recorded alongside a persisted index.

use crate::embeddings::provider::EmbeddingProvider;
use delve_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Which provider/model produced the vectors of an index.
///
/// Stored in the snapshot so that a restart with a different embedding
/// configuration is detected instead of silently mixing vector spaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "hash" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,
}

impl EmbeddingConfig {
    /// Identity of a live provider.
    pub fn from_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self {
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
        }
    }

    /// Validate that another config is consistent with this one.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.provider != other.provider {
            return Err(AppError::Knowledge(format!(
                "Provider mismatch: index was built with '{}', configured '{}'",
                self.provider, other.provider
            )));
        }

        if self.model != other.model {
            return Err(AppError::Knowledge(format!(
                "Model mismatch: index was built with '{}', configured '{}'",
                self.model, other.model
            )));
        }

        if self.dimensions != other.dimensions {
            return Err(AppError::Knowledge(format!(
                "Dimension mismatch: index was built with {}, configured {}",
                self.dimensions, other.dimensions
            )));
        }

        Ok(())
    }
}
