//! Local document corpus for Delve.
//!
//! Documents are parsed into text, split into overlapping character chunks,
//! embedded, and held in an in-memory index that is snapshotted to
//! `.delve/index/snapshot.json`.

pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use index::{EmbeddingIndex, IndexEntry, IndexSnapshot};
pub use store::KnowledgeBase;
pub use types::{
    Chunk, ChunkId, Document, DocumentType, IngestSummary, KnowledgeStats, ScoredChunk,
};
