//! Embedding capability used by the index.
//!
//! Providers turn text into fixed-length vectors. `hash` is deterministic
//! and offline; `ollama` calls a local embedding model.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
