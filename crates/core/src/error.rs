//! Error types for Delve.
//!
//! This module defines a unified error enum that covers all error categories
//! in the engine. Ingestion and retrieval failures carry their own nested
//! enums so callers can tell a rejected document from a flaky service.

use thiserror::Error;

/// Unified error type for Delve.
///
/// All functions in the engine return `Result<T, AppError>`.
/// Errors are represented and propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, HTTP status, bad payload)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Document could not be turned into chunks
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Embedding, search or other retrieval failure
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Answer generation failed after retries
    #[error("Synthesis unavailable: {0}")]
    Synthesis(String),

    /// Malformed model output (citations and the like)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Knowledge base and index errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt and template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Research session errors (unknown id, illegal transition)
    #[error("Research error: {0}")]
    Research(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Reasons a document is rejected at ingestion. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestionError {
    #[error("unsupported format for '{name}': {reason}")]
    UnsupportedFormat { name: String, reason: String },

    #[error("document '{0}' contains no extractable text")]
    EmptyDocument(String),
}

/// Failures talking to retrieval backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),

    #[error("search service unavailable: {0}")]
    SearchUnavailable(String),

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },
}

impl AppError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Rejected documents, bad configuration and validation problems are
    /// deterministic; transport-level failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Llm(_) | AppError::Retrieval(_) | AppError::Io(_)
        )
    }

    /// Whether the error is a timeout of an external call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Retrieval(RetrievalError::Timeout { .. }))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
