//! Document store: ingestion, listing, deletion and snapshot persistence.

use crate::chunker;
use crate::embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
use crate::index::{EmbeddingIndex, IndexSnapshot};
use crate::parser;
use crate::types::{Document, IngestSummary, KnowledgeStats, ScoredChunk};
use chrono::Utc;
use delve_core::config::{AppConfig, ChunkingSettings};
use delve_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use walkdir::WalkDir;

const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of the knowledge base.
#[derive(Debug, Serialize, Deserialize)]
struct KnowledgeSnapshot {
    version: u32,
    embedding: EmbeddingConfig,
    documents: Vec<Document>,
    index: IndexSnapshot,
}

/// Local document corpus backed by an embedding index.
///
/// Ingestion and deletion of one document are serialized by a per-document
/// lock; different documents proceed independently.
#[derive(Debug)]
pub struct KnowledgeBase {
    index: EmbeddingIndex,
    documents: RwLock<BTreeMap<String, Document>>,
    document_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    chunking: ChunkingSettings,
    snapshot_path: Option<PathBuf>,
}

impl KnowledgeBase {
    /// Create an empty, memory-only knowledge base.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, chunking: ChunkingSettings) -> AppResult<Self> {
        chunker::validate_params(chunking.chunk_size, chunking.chunk_overlap)?;

        Ok(Self {
            index: EmbeddingIndex::new(provider),
            documents: RwLock::new(BTreeMap::new()),
            document_locks: Mutex::new(HashMap::new()),
            chunking,
            snapshot_path: None,
        })
    }

    /// Open the workspace knowledge base, loading its snapshot if present.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        let provider = create_provider(&config.embedding, config.retry.policy())?;
        let path = config.index_dir().join(SNAPSHOT_FILE);
        Self::new(provider, config.chunking)?.with_snapshot_path(path).await
    }

    /// Attach a snapshot file, loading it when it exists.
    pub async fn with_snapshot_path(mut self, path: PathBuf) -> AppResult<Self> {
        if path.exists() {
            self.load_snapshot(&path).await?;
        }
        self.snapshot_path = Some(path);
        Ok(self)
    }

    /// Ingest a document from raw bytes.
    ///
    /// Re-ingesting an existing name replaces its chunks and embeddings.
    pub async fn ingest(
        &self,
        name: &str,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> AppResult<Document> {
        tracing::info!("Ingesting document '{}' ({} bytes)", name, bytes.len());

        let doc_type = parser::resolve_type(name, declared_type)?;
        let text = parser::extract_text(name, bytes, doc_type)?;
        let chunks = chunker::chunk_text(
            name,
            &text,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        )?;

        let lock = self.document_lock(name).await;
        let _guard = lock.lock().await;

        self.index.replace_document(name, &chunks).await?;

        let document = Document {
            name: name.to_string(),
            doc_type,
            size_bytes: bytes.len() as u64,
            ingested_at: Utc::now(),
            chunk_count: chunks.len(),
        };

        let replaced = self
            .documents
            .write()
            .await
            .insert(name.to_string(), document.clone())
            .is_some();

        tracing::info!(
            "Ingested '{}' as {}: {} chunks{}",
            name,
            doc_type,
            document.chunk_count,
            if replaced { " (replaced previous version)" } else { "" }
        );

        Ok(document)
    }

    /// Ingest a single file, named after its file name.
    pub async fn ingest_path(&self, path: &Path, declared_type: Option<&str>) -> AppResult<Document> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Knowledge(format!("Invalid document path: {:?}", path)))?;

        let bytes = tokio::fs::read(path).await?;
        self.ingest(name, &bytes, declared_type).await
    }

    /// Ingest every supported file below `dir`.
    ///
    /// Files of unknown type and rejected documents are reported in the
    /// summary instead of failing the whole walk. Embedding failures still
    /// abort, since every later file would fail the same way.
    pub async fn ingest_dir(&self, dir: &Path) -> AppResult<IngestSummary> {
        let mut summary = IngestSummary::default();

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        for path in files {
            let shown = path.display().to_string();

            if crate::types::DocumentType::from_path(&path).is_none() {
                tracing::warn!("Skipping unsupported file: {}", shown);
                summary
                    .skipped
                    .push((shown, "unsupported file type".to_string()));
                continue;
            }

            match self.ingest_path(&path, None).await {
                Ok(document) => summary.ingested.push(document),
                Err(AppError::Ingestion(e)) => {
                    tracing::warn!("Rejected {}: {}", shown, e);
                    summary.skipped.push((shown, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    /// All documents, ordered by name.
    pub async fn list_documents(&self) -> Vec<Document> {
        self.documents.read().await.values().cloned().collect()
    }

    /// Delete a document and every embedding derived from it.
    pub async fn delete_document(&self, name: &str) -> AppResult<Document> {
        let lock = self.document_lock(name).await;
        let _guard = lock.lock().await;

        let document = self
            .documents
            .write()
            .await
            .remove(name)
            .ok_or_else(|| AppError::Knowledge(format!("Document not found: {}", name)))?;

        let removed = self.index.delete(name).await;
        tracing::info!("Deleted document '{}' ({} chunks)", name, removed);

        drop(_guard);
        self.release_document_lock(name, lock).await;

        Ok(document)
    }

    /// Nearest chunks for a query.
    pub async fn search(&self, query: &str, k: usize) -> AppResult<Vec<ScoredChunk>> {
        self.index.query(query, k).await
    }

    pub async fn stats(&self) -> KnowledgeStats {
        let provider = self.index.provider();
        KnowledgeStats {
            documents: self.documents.read().await.len(),
            chunks: self.index.len().await,
            embedding_provider: provider.provider_name().to_string(),
            embedding_model: provider.model_name().to_string(),
            dimensions: self.index.dimensions().await,
        }
    }

    /// Write the snapshot file, if one is attached.
    pub async fn persist(&self) -> AppResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let snapshot = KnowledgeSnapshot {
            version: SNAPSHOT_VERSION,
            embedding: EmbeddingConfig::from_provider(self.index.provider().as_ref()),
            documents: self.list_documents().await,
            index: self.index.snapshot().await,
        };

        let json = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash never leaves a truncated snapshot
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!(
            "Persisted knowledge snapshot: {} documents, {} chunks",
            snapshot.documents.len(),
            snapshot.index.entries.len()
        );

        Ok(())
    }

    async fn load_snapshot(&self, path: &Path) -> AppResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: KnowledgeSnapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AppError::Knowledge(format!(
                "Unsupported snapshot version {} in {:?}",
                snapshot.version, path
            )));
        }

        let current = EmbeddingConfig::from_provider(self.index.provider().as_ref());
        snapshot.embedding.validate_consistency(&current).map_err(|e| {
            AppError::Knowledge(format!(
                "{}. Remove {:?} and re-add your documents to rebuild the index",
                e, path
            ))
        })?;

        let chunk_total = snapshot.index.entries.len();
        self.index.restore(snapshot.index).await?;

        let mut documents = self.documents.write().await;
        documents.clear();
        for document in snapshot.documents {
            documents.insert(document.name.clone(), document);
        }

        tracing::info!(
            "Loaded knowledge snapshot: {} documents, {} chunks",
            documents.len(),
            chunk_total
        );

        Ok(())
    }

    async fn document_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.document_locks.lock().await;
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Forget the lock of `name` once nobody else holds or waits on it.
    ///
    /// Clones are only handed out under the map lock, so a count of two
    /// (the map and `lock`) means no other task can be using it.
    async fn release_document_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.document_locks.lock().await;
        let unused = locks
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            locks.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::HashingProvider;
    use crate::types::DocumentType;
    use delve_core::IngestionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Hashing embedder that sleeps per batch and records peak concurrency.
    #[derive(Debug)]
    struct SlowEmbedder {
        inner: HashingProvider,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowEmbedder {
        fn new(delay: Duration) -> Self {
            Self {
                inner: HashingProvider::new(32),
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn provider_name(&self) -> &str {
            self.inner.provider_name()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    fn knowledge_base(chunk_size: usize, chunk_overlap: usize) -> KnowledgeBase {
        KnowledgeBase::new(
            Arc::new(HashingProvider::new(128)),
            ChunkingSettings {
                chunk_size,
                chunk_overlap,
            },
        )
        .unwrap()
    }

    fn sample_text(chars: usize) -> String {
        "Vector search finds similar passages. "
            .chars()
            .cycle()
            .take(chars)
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_three_thousand_characters() {
        let kb = knowledge_base(1000, 200);
        let document = kb
            .ingest("notes.txt", sample_text(3000).as_bytes(), None)
            .await
            .unwrap();

        assert_eq!(document.doc_type, DocumentType::Text);
        assert_eq!(document.chunk_count, 4);
        assert_eq!(kb.stats().await.chunks, 4);
    }

    #[tokio::test]
    async fn test_reingest_keeps_boundaries() {
        let kb = knowledge_base(100, 20);
        let text = sample_text(450);

        kb.ingest("a.txt", text.as_bytes(), None).await.unwrap();
        let first = kb.index.snapshot().await;

        kb.ingest("a.txt", text.as_bytes(), None).await.unwrap();
        let second = kb.index.snapshot().await;

        let bounds = |s: &IndexSnapshot| -> Vec<(usize, usize)> {
            s.entries.iter().map(|e| (e.chunk.start, e.chunk.end)).collect()
        };
        assert_eq!(bounds(&first), bounds(&second));
        assert_eq!(kb.list_documents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reingest_shorter_version_drops_stale_chunks() {
        let kb = knowledge_base(100, 20);
        kb.ingest("a.txt", sample_text(450).as_bytes(), None).await.unwrap();
        kb.ingest("a.txt", sample_text(90).as_bytes(), None).await.unwrap();

        assert_eq!(kb.stats().await.chunks, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_embeddings() {
        let kb = knowledge_base(100, 20);
        kb.ingest("gone.md", b"# Rust\nOwnership and borrowing", None)
            .await
            .unwrap();
        kb.ingest("kept.txt", b"Tomato soup recipe", None).await.unwrap();

        kb.delete_document("gone.md").await.unwrap();

        let results = kb.search("ownership borrowing", 10).await.unwrap();
        assert!(results.iter().all(|r| r.chunk.id.document_id != "gone.md"));
        assert_eq!(kb.list_documents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_document_stays_exclusive_across_delete() {
        let embedder = Arc::new(SlowEmbedder::new(Duration::from_millis(60)));
        let kb = KnowledgeBase::new(
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            ChunkingSettings {
                chunk_size: 100,
                chunk_overlap: 20,
            },
        )
        .unwrap();
        let text = sample_text(150);

        // The delete and the second ingest queue behind the first ingest;
        // the third ingest arrives after the delete has released its lock
        let (first, deleted, second, third) = tokio::join!(
            kb.ingest("a.txt", text.as_bytes(), None),
            kb.delete_document("a.txt"),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                kb.ingest("a.txt", text.as_bytes(), None).await
            },
            async {
                tokio::time::sleep(Duration::from_millis(90)).await;
                kb.ingest("a.txt", text.as_bytes(), None).await
            },
        );

        first.unwrap();
        deleted.unwrap();
        second.unwrap();
        third.unwrap();
        assert_eq!(embedder.peak.load(Ordering::SeqCst), 1);
        assert_eq!(kb.list_documents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_forgets_unused_lock() {
        let kb = knowledge_base(100, 20);
        kb.ingest("a.txt", b"short text", None).await.unwrap();
        kb.delete_document("a.txt").await.unwrap();

        assert!(kb.document_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_document() {
        let kb = knowledge_base(100, 20);
        assert!(kb.delete_document("missing.md").await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_document_leaves_store_unchanged() {
        let kb = knowledge_base(100, 20);
        let result = kb.ingest("blank.txt", b"   \n  ", None).await;

        assert!(matches!(
            result,
            Err(AppError::Ingestion(IngestionError::EmptyDocument(_)))
        ));
        assert!(kb.list_documents().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_chunking_params() {
        let result = KnowledgeBase::new(
            Arc::new(HashingProvider::new(8)),
            ChunkingSettings {
                chunk_size: 100,
                chunk_overlap: 100,
            },
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_ingest_dir_skips_unsupported_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.md"), "# Title\nBody text").unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested/b.txt"), "Plain body").unwrap();
        std::fs::write(temp.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(temp.path().join("empty.txt"), "  ").unwrap();

        let kb = knowledge_base(100, 20);
        let summary = kb.ingest_dir(temp.path()).await.unwrap();

        let names: Vec<String> = summary.ingested.iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
        assert_eq!(summary.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index").join(SNAPSHOT_FILE);

        let kb = knowledge_base(100, 20)
            .with_snapshot_path(path.clone())
            .await
            .unwrap();
        kb.ingest("a.txt", sample_text(250).as_bytes(), None)
            .await
            .unwrap();
        kb.persist().await.unwrap();

        let reopened = knowledge_base(100, 20)
            .with_snapshot_path(path)
            .await
            .unwrap();
        let stats = reopened.stats().await;
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.dimensions, Some(128));
    }

    #[tokio::test]
    async fn test_reopen_with_other_embedding_model_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SNAPSHOT_FILE);

        let kb = knowledge_base(100, 20)
            .with_snapshot_path(path.clone())
            .await
            .unwrap();
        kb.ingest("a.txt", b"some text", None).await.unwrap();
        kb.persist().await.unwrap();

        let other = KnowledgeBase::new(
            Arc::new(HashingProvider::new(64)),
            ChunkingSettings::default(),
        )
        .unwrap();
        let result = other.with_snapshot_path(path).await;
        assert!(result.unwrap_err().to_string().contains("Dimension mismatch"));
    }
}
