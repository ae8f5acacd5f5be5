//! Delve Core Library
//!
//! This crate provides the foundational utilities shared by every Delve crate:
//! - Error handling (`AppError`, `AppResult`) and the failure taxonomy
//! - Logging infrastructure
//! - Configuration management
//! - Retry with bounded exponential backoff

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, IngestionError, RetrievalError};
pub use retry::{retry_with_backoff, RetryPolicy};
