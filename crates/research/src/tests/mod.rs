//! End-to-end research scenarios against scripted capabilities.

mod local_research;

use crate::engine::{EngineComponents, EngineOptions, ResearchEngine};
use crate::testing::{ScriptedLlm, ScriptedWebSearch, TopicEmbedder};
use delve_core::config::{CacheSettings, ChunkingSettings, ResearchSettings};
use delve_core::RetryPolicy;
use delve_knowledge::KnowledgeBase;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const TOPICS: &[&str] = &["photosynthesis", "volcano"];

/// 312 characters; every 100-character chunk mentions photosynthesis.
pub(crate) fn photosynthesis_text() -> String {
    "Photosynthesis converts light into chemical energy. ".repeat(6)
}

pub(crate) fn volcano_text() -> String {
    "A volcano vents magma, ash and gases from below. ".repeat(4)
}

pub(crate) struct Harness {
    pub engine: ResearchEngine,
    pub llm: Arc<ScriptedLlm>,
    pub web: Option<Arc<ScriptedWebSearch>>,
    pub embedder: Arc<TopicEmbedder>,
    pub dir: TempDir,
}

pub(crate) fn options(dir: &Path) -> EngineOptions {
    EngineOptions {
        research: ResearchSettings::default(),
        cache: CacheSettings::default(),
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        llm_model: "test-model".to_string(),
        tool_timeout: Duration::from_millis(500),
        generation_timeout: Duration::from_secs(2),
        sessions_dir: Some(dir.join("sessions")),
        reports_dir: Some(dir.join("reports")),
        prompts_dir: None,
    }
}

/// Build an engine over scripted capabilities.
pub(crate) fn harness(
    embedder: TopicEmbedder,
    llm: ScriptedLlm,
    web: Option<ScriptedWebSearch>,
    configure: impl FnOnce(&mut EngineOptions),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let embedder = Arc::new(embedder);
    let llm = Arc::new(llm);
    let web = web.map(Arc::new);

    let knowledge = KnowledgeBase::new(
        embedder.clone(),
        ChunkingSettings {
            chunk_size: 100,
            chunk_overlap: 20,
        },
    )
    .unwrap();

    let mut opts = options(dir.path());
    configure(&mut opts);

    let engine = ResearchEngine::new(
        EngineComponents {
            knowledge: Arc::new(knowledge),
            llm: llm.clone(),
            web: web.clone().map(|w| w as Arc<dyn crate::web::WebSearchProvider>),
        },
        opts,
    );

    Harness {
        engine,
        llm,
        web,
        embedder,
        dir,
    }
}

/// Engine with the photosynthesis document already ingested.
pub(crate) async fn with_photosynthesis(
    llm: ScriptedLlm,
    web: Option<ScriptedWebSearch>,
    configure: impl FnOnce(&mut EngineOptions),
) -> Harness {
    let h = harness(TopicEmbedder::new(TOPICS), llm, web, configure);
    h.engine
        .ingest("photosynthesis.txt", photosynthesis_text().as_bytes(), None)
        .await
        .unwrap();
    h
}
