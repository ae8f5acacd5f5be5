//! In-memory embedding index with cosine nearest-neighbour search.
//!
//! Vectors are computed outside the lock; the map itself is only locked for
//! the duration of an insert, delete or scan, so queries never wait on
//! embedding work.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Chunk, ChunkId, ScoredChunk};
use delve_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A stored chunk and its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Serializable contents of an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimensions: Option<usize>,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Fixed by the first stored vector
    dimensions: Option<usize>,
    entries: BTreeMap<ChunkId, IndexEntry>,
}

impl IndexState {
    fn check_dimensions(&self, embeddings: &[Vec<f32>]) -> AppResult<Option<usize>> {
        let mut dimensions = self.dimensions;
        for embedding in embeddings {
            match dimensions {
                Some(expected) if expected != embedding.len() => {
                    return Err(AppError::Knowledge(format!(
                        "Embedding dimension mismatch: index holds {}-dimensional vectors, got {}",
                        expected,
                        embedding.len()
                    )));
                }
                Some(_) => {}
                None => dimensions = Some(embedding.len()),
            }
        }
        Ok(dimensions)
    }
}

/// Embedding index keyed by `ChunkId`.
#[derive(Debug)]
pub struct EmbeddingIndex {
    provider: Arc<dyn EmbeddingProvider>,
    state: RwLock<IndexState>,
}

impl EmbeddingIndex {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed and store chunks, replacing any vector already stored under
    /// the same id.
    pub async fn upsert(&self, chunks: &[Chunk]) -> AppResult<usize> {
        let embeddings = self.embed_chunks(chunks).await?;

        let mut state = self.state.write().await;
        state.dimensions = state.check_dimensions(&embeddings)?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            state.entries.insert(
                chunk.id.clone(),
                IndexEntry {
                    chunk: chunk.clone(),
                    embedding,
                },
            );
        }

        Ok(chunks.len())
    }

    /// Swap every chunk of a document for a new set in one write.
    ///
    /// Embedding happens first; if it fails the previous chunks stay.
    pub async fn replace_document(&self, document_id: &str, chunks: &[Chunk]) -> AppResult<usize> {
        let embeddings = self.embed_chunks(chunks).await?;

        let mut state = self.state.write().await;
        state.entries.retain(|id, _| id.document_id != document_id);
        if state.entries.is_empty() {
            state.dimensions = None;
        }
        state.dimensions = state.check_dimensions(&embeddings)?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            state.entries.insert(
                chunk.id.clone(),
                IndexEntry {
                    chunk: chunk.clone(),
                    embedding,
                },
            );
        }

        Ok(chunks.len())
    }

    /// Return the `k` chunks closest to `text`.
    ///
    /// Scores are cosine similarity mapped to `[0, 1]` as `(cos + 1) / 2`.
    /// Equal scores are ordered by ascending `ChunkId`.
    pub async fn query(&self, text: &str, k: usize) -> AppResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.provider.embed(text).await?;

        let state = self.state.read().await;
        if let Some(expected) = state.dimensions {
            if expected != query.len() {
                return Err(AppError::Knowledge(format!(
                    "Query embedding has {} dimensions, index holds {}",
                    query.len(),
                    expected
                )));
            }
        }

        // BTreeMap iteration is already in ChunkId order; the stable sort keeps it for ties
        let mut scored: Vec<ScoredChunk> = state
            .entries
            .values()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: normalized_similarity(&query, &entry.embedding),
            })
            .collect();
        drop(state);

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        tracing::debug!(
            "Index query returned {} chunks (top score: {:.3})",
            scored.len(),
            scored.first().map(|s| s.score).unwrap_or(0.0)
        );

        Ok(scored)
    }

    /// Remove every chunk of a document. Returns how many were removed.
    pub async fn delete(&self, document_id: &str) -> usize {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|id, _| id.document_id != document_id);
        if state.entries.is_empty() {
            state.dimensions = None;
        }
        before - state.entries.len()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }

    pub async fn snapshot(&self) -> IndexSnapshot {
        let state = self.state.read().await;
        IndexSnapshot {
            dimensions: state.dimensions,
            entries: state.entries.values().cloned().collect(),
        }
    }

    /// Replace the index contents with a snapshot.
    pub async fn restore(&self, snapshot: IndexSnapshot) -> AppResult<()> {
        let mut restored = IndexState {
            dimensions: snapshot.dimensions,
            entries: BTreeMap::new(),
        };
        let embeddings: Vec<Vec<f32>> = snapshot.entries.iter().map(|e| e.embedding.clone()).collect();
        restored.dimensions = restored.check_dimensions(&embeddings)?;

        for entry in snapshot.entries {
            restored.entries.insert(entry.chunk.id.clone(), entry);
        }

        *self.state.write().await = restored;
        Ok(())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> AppResult<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.provider.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::Knowledge(format!(
                "Embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity mapped to `[0, 1]`.
pub fn normalized_similarity(a: &[f32], b: &[f32]) -> f32 {
    (cosine_similarity(a, b) + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::HashingProvider;

    fn chunk(document: &str, position: u32, text: &str) -> Chunk {
        Chunk {
            id: ChunkId::new(document, position),
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(Arc::new(HashingProvider::new(128)))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((normalized_similarity(&[1.0, 0.0], &[-1.0, 0.0])).abs() < 1e-6);
        assert_eq!(normalized_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.5);
    }

    #[tokio::test]
    async fn test_query_ranks_best_match_first() {
        let index = index();
        index
            .upsert(&[
                chunk("rust.md", 0, "Rust ownership and borrowing rules"),
                chunk("cooking.md", 0, "Slow roasted tomatoes with garlic"),
            ])
            .await
            .unwrap();

        let results = index.query("ownership borrowing rust", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id.document_id, "rust.md");
        assert!(results[0].score > results[1].score);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_ties_break_by_chunk_id() {
        let index = index();
        let text = "identical passage about vectors";
        index
            .upsert(&[
                chunk("b.md", 0, text),
                chunk("a.md", 3, text),
                chunk("a.md", 1, text),
            ])
            .await
            .unwrap();

        let results = index.query(text, 3).await.unwrap();
        let ids: Vec<ChunkId> = results.into_iter().map(|r| r.chunk.id).collect();
        assert_eq!(
            ids,
            vec![
                ChunkId::new("a.md", 1),
                ChunkId::new("a.md", 3),
                ChunkId::new("b.md", 0)
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = index();
        let chunks = [chunk("a.md", 0, "first version")];
        index.upsert(&chunks).await.unwrap();
        index.upsert(&chunks).await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_dimension_is_fixed_by_first_vector() {
        let index = index();
        index.upsert(&[chunk("a.md", 0, "hello")]).await.unwrap();

        let snapshot = IndexSnapshot {
            dimensions: None,
            entries: vec![
                IndexEntry {
                    chunk: chunk("a.md", 0, "x"),
                    embedding: vec![1.0; 4],
                },
                IndexEntry {
                    chunk: chunk("a.md", 1, "y"),
                    embedding: vec![1.0; 5],
                },
            ],
        };
        assert!(index.restore(snapshot).await.is_err());
        assert_eq!(index.dimensions().await, Some(128));
    }

    #[tokio::test]
    async fn test_delete_removes_document_chunks() {
        let index = index();
        index
            .upsert(&[
                chunk("a.md", 0, "alpha text"),
                chunk("a.md", 1, "more alpha text"),
                chunk("b.md", 0, "beta text"),
            ])
            .await
            .unwrap();

        assert_eq!(index.delete("a.md").await, 2);

        let results = index.query("alpha text", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id.document_id, "b.md");
    }

    #[tokio::test]
    async fn test_replace_document() {
        let index = index();
        index
            .upsert(&[chunk("a.md", 0, "old"), chunk("a.md", 1, "old tail")])
            .await
            .unwrap();

        index
            .replace_document("a.md", &[chunk("a.md", 0, "new")])
            .await
            .unwrap();

        let snapshot = index.snapshot().await;
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let source = index();
        source
            .upsert(&[chunk("a.md", 0, "persisted passage")])
            .await
            .unwrap();
        let snapshot = source.snapshot().await;

        let restored = index();
        restored.restore(snapshot).await.unwrap();

        let results = restored.query("persisted passage", 1).await.unwrap();
        assert_eq!(results[0].chunk.id, ChunkId::new("a.md", 0));
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }
}
