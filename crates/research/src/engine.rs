//! Research engine: the owner of every shared resource.
//!
//! One `ResearchEngine` serves many concurrent sessions. It owns the
//! knowledge base, the result caches and the tool-call limiter, and keeps
//! completed sessions so reports can be rendered later.

use crate::agent::ResearchAgent;
use crate::cache::ResultCache;
use crate::cancel::CancellationToken;
use crate::quality::QualityAssessor;
use crate::report::{render_report, report_file_name};
use crate::session::{ResearchOutcome, ResearchSession, SessionSummary};
use crate::synthesizer::{SynthesisOptions, Synthesizer};
use crate::types::{ReportHandle, ToolKind};
use crate::web::{self, WebSearchConnector, WebSearchProvider};
use delve_core::config::{CacheSettings, ResearchSettings};
use delve_core::{AppConfig, AppError, AppResult, RetryPolicy};
use delve_knowledge::{Document, IngestSummary, KnowledgeBase};
use delve_llm::LlmClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

/// Tunables for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub research: ResearchSettings,
    pub cache: CacheSettings,
    pub retry: RetryPolicy,
    pub llm_model: String,
    pub tool_timeout: Duration,
    pub generation_timeout: Duration,

    /// Where completed sessions are saved; `None` keeps them in memory only
    pub sessions_dir: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub prompts_dir: Option<PathBuf>,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            research: config.research.clone(),
            cache: config.cache,
            retry: config.retry.policy(),
            llm_model: config.llm.model.clone(),
            tool_timeout: config.research.tool_timeout(),
            generation_timeout: config.research.generation_timeout(),
            sessions_dir: Some(config.sessions_dir()),
            reports_dir: Some(config.reports_dir()),
            prompts_dir: Some(config.prompts_dir()),
        }
    }
}

/// External capabilities the engine is built from.
pub struct EngineComponents {
    pub knowledge: Arc<KnowledgeBase>,
    pub llm: Arc<dyn LlmClient>,
    /// `None` disables web search
    pub web: Option<Arc<dyn WebSearchProvider>>,
}

/// Snapshot reported by `delve status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub documents: usize,
    pub chunks: usize,
    pub llm_provider: String,
    pub llm_model: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: Option<usize>,
    pub web_provider: Option<String>,
    pub sessions: usize,
}

pub struct ResearchEngine {
    agent: ResearchAgent,
    knowledge: Arc<KnowledgeBase>,
    sessions: RwLock<HashMap<String, ResearchSession>>,
    llm_provider: String,
    llm_model: String,
    sessions_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    prompts_dir: Option<PathBuf>,
}

impl ResearchEngine {
    pub fn new(components: EngineComponents, options: EngineOptions) -> Self {
        let ttl = Duration::from_secs(options.cache.ttl_secs);
        let web = components.web.map(|provider| {
            WebSearchConnector::new(provider, options.tool_timeout, options.retry)
        });

        let synthesizer = Synthesizer::new(
            Arc::clone(&components.llm),
            SynthesisOptions {
                model: options.llm_model.clone(),
                max_tokens: options.research.max_tokens,
                temperature: options.research.temperature,
                timeout: options.generation_timeout,
                retry: options.retry,
                prompts_dir: options.prompts_dir.clone(),
            },
        );

        let agent = ResearchAgent {
            knowledge: Arc::clone(&components.knowledge),
            web,
            local_cache: Arc::new(ResultCache::new(options.cache.capacity, ttl)),
            web_cache: Arc::new(ResultCache::new(options.cache.capacity, ttl)),
            limiter: Arc::new(Semaphore::new(options.research.max_concurrent_tool_calls.max(1))),
            assessor: QualityAssessor::from_settings(&options.research),
            synthesizer,
            settings: options.research,
            tool_timeout: options.tool_timeout,
        };

        Self {
            agent,
            knowledge: components.knowledge,
            sessions: RwLock::new(HashMap::new()),
            llm_provider: components.llm.provider_name().to_string(),
            llm_model: options.llm_model,
            sessions_dir: options.sessions_dir,
            reports_dir: options.reports_dir,
            prompts_dir: options.prompts_dir,
        }
    }

    /// Open the workspace engine: knowledge snapshot, saved sessions and
    /// the configured providers.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        config.ensure_state_dirs()?;

        let knowledge = Arc::new(KnowledgeBase::open(config).await?);
        let llm = delve_llm::create_client(&config.llm, config.resolve_api_key().as_deref())?;
        let web = web::create_provider(&config.web, config.research.tool_timeout())?;

        let engine = Self::new(
            EngineComponents {
                knowledge,
                llm,
                web,
            },
            EngineOptions::from_config(config),
        );
        engine.load_sessions().await?;

        tracing::info!("Research engine opened at {:?}", config.workspace);
        Ok(engine)
    }

    /// Persist the knowledge snapshot.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.knowledge.persist().await?;
        tracing::debug!("Research engine shut down");
        Ok(())
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Answer a question.
    ///
    /// Tool and generation failures never make this fail; they show up in
    /// the outcome's status and step trace.
    pub async fn research(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ResearchOutcome> {
        let session = self.agent.run(question, cancel).await?;
        let outcome = ResearchOutcome::from(&session);

        if let Err(e) = self.save_session(&session).await {
            tracing::warn!("Failed to save session {}: {}", session.id, e);
        }
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);

        Ok(outcome)
    }

    pub async fn get_session(&self, research_id: &str) -> AppResult<ResearchSession> {
        self.sessions
            .read()
            .await
            .get(research_id)
            .cloned()
            .ok_or_else(|| AppError::Research(format!("Unknown research id: {}", research_id)))
    }

    /// Completed sessions, newest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> =
            sessions.values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Render the session report to `<reports_dir>/<research_id>.md`.
    pub async fn generate_report(&self, research_id: &str) -> AppResult<ReportHandle> {
        let session = self.get_session(research_id).await?;
        let markdown = render_report(&session, self.prompts_dir.as_deref())?;

        let reports_dir = self.reports_dir.as_ref().ok_or_else(|| {
            AppError::Config("No reports directory configured".to_string())
        })?;
        tokio::fs::create_dir_all(reports_dir).await?;

        let path = reports_dir.join(format!("{}.md", checked_id(research_id)?));
        tokio::fs::write(&path, markdown).await?;
        tracing::info!("Report for {} written to {:?}", research_id, path);

        Ok(ReportHandle {
            research_id: session.id.clone(),
            file_name: report_file_name(&session),
            path,
        })
    }

    /// Remove a session record and its report artifact.
    pub async fn purge(&self, research_id: &str) -> AppResult<()> {
        let id = checked_id(research_id)?;
        self.sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::Research(format!("Unknown research id: {}", id)))?;

        if let Some(dir) = &self.sessions_dir {
            remove_if_exists(&dir.join(format!("{}.json", id))).await?;
        }
        if let Some(dir) = &self.reports_dir {
            remove_if_exists(&dir.join(format!("{}.md", id))).await?;
        }

        tracing::info!("Purged research session {}", id);
        Ok(())
    }

    /// Ingest raw bytes. Cached local results are dropped since they may
    /// no longer reflect the index.
    pub async fn ingest(
        &self,
        name: &str,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> AppResult<Document> {
        let document = self.knowledge.ingest(name, bytes, declared_type).await?;
        self.invalidate_local_results();
        Ok(document)
    }

    pub async fn ingest_path(&self, path: &Path, declared_type: Option<&str>) -> AppResult<Document> {
        let document = self.knowledge.ingest_path(path, declared_type).await?;
        self.invalidate_local_results();
        Ok(document)
    }

    pub async fn ingest_dir(&self, dir: &Path) -> AppResult<IngestSummary> {
        let summary = self.knowledge.ingest_dir(dir).await;
        // Part of the directory may have landed before an error
        self.invalidate_local_results();
        summary
    }

    pub async fn list_documents(&self) -> Vec<Document> {
        self.knowledge.list_documents().await
    }

    pub async fn delete_document(&self, name: &str) -> AppResult<Document> {
        let document = self.knowledge.delete_document(name).await?;
        self.invalidate_local_results();
        Ok(document)
    }

    pub async fn status(&self) -> EngineStatus {
        let stats = self.knowledge.stats().await;
        EngineStatus {
            documents: stats.documents,
            chunks: stats.chunks,
            llm_provider: self.llm_provider.clone(),
            llm_model: self.llm_model.clone(),
            embedding_provider: stats.embedding_provider,
            embedding_model: stats.embedding_model,
            dimensions: stats.dimensions,
            web_provider: self.agent.web.as_ref().map(|w| w.provider_name().to_string()),
            sessions: self.sessions.read().await.len(),
        }
    }

    fn invalidate_local_results(&self) {
        let dropped = self.agent.local_cache.invalidate_tool(ToolKind::LocalSearch);
        if dropped > 0 {
            tracing::debug!("Dropped {} cached local search results", dropped);
        }
    }

    async fn save_session(&self, session: &ResearchSession) -> AppResult<()> {
        let Some(dir) = &self.sessions_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.json", checked_id(&session.id)?));
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!("Saved session {} to {:?}", session.id, path);
        Ok(())
    }

    pub(crate) async fn load_sessions(&self) -> AppResult<()> {
        let Some(dir) = &self.sessions_dir else {
            return Ok(());
        };
        if !dir.exists() {
            return Ok(());
        }

        let mut loaded = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = tokio::fs::read(&path)
                .await
                .map_err(AppError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<ResearchSession>(&bytes)?));
            match parsed {
                Ok(session) => {
                    loaded.insert(session.id.clone(), session);
                }
                Err(e) => tracing::warn!("Skipping unreadable session file {:?}: {}", path, e),
            }
        }

        tracing::debug!("Loaded {} saved sessions", loaded.len());
        *self.sessions.write().await = loaded;
        Ok(())
    }
}

/// Research ids double as file names; refuse anything that could escape
/// the state directory.
fn checked_id(research_id: &str) -> AppResult<&str> {
    let valid = !research_id.is_empty()
        && research_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(research_id)
    } else {
        Err(AppError::Validation(format!(
            "Invalid research id: {:?}",
            research_id
        )))
    }
}

async fn remove_if_exists(path: &Path) -> AppResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_id() {
        assert!(checked_id("0123abcd-0000-4000-8000-000000000000").is_ok());
        assert!(checked_id("../etc/passwd").is_err());
        assert!(checked_id("").is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = AppConfig::default();
        let options = EngineOptions::from_config(&config);
        assert_eq!(options.tool_timeout, Duration::from_secs(10));
        assert_eq!(options.retry.max_attempts, 3);
        assert!(options.reports_dir.unwrap().ends_with(".delve/reports"));
    }
}
