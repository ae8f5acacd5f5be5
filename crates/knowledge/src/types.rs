//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kind of document accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Markdown,
    Text,
}

impl DocumentType {
    /// Parse a declared type ("pdf", "md", "markdown", "txt", "text").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pdf" | "application/pdf" => Some(Self::Pdf),
            "md" | "markdown" | "text/markdown" => Some(Self::Markdown),
            "txt" | "text" | "text/plain" => Some(Self::Text),
            _ => None,
        }
    }

    /// Detect document type from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested document. Its name is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,

    #[serde(rename = "type")]
    pub doc_type: DocumentType,

    pub size_bytes: u64,

    pub ingested_at: DateTime<Utc>,

    pub chunk_count: usize,
}

/// Stable identity of a chunk: parent document, then position.
///
/// Field order matters: the derived `Ord` compares the document id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub position: u32,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, position: u32) -> Self {
        Self {
            document_id: document_id.into(),
            position,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.position)
    }
}

/// A text span of one document.
///
/// `start` and `end` are character offsets into the extracted text,
/// half-open (`[start, end)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    /// Number of characters covered by this chunk.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,

    /// Cosine similarity mapped to `[0, 1]`
    pub score: f32,
}

/// Counters reported by `delve status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: Option<usize>,
}

/// Outcome of a directory ingestion.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub ingested: Vec<Document>,

    /// Files that were skipped or rejected, with the reason.
    pub skipped: Vec<(String, String)>,
}
