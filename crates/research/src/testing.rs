//! Test doubles for the external capabilities.

use crate::cache::normalize_query;
use crate::types::WebResult;
use crate::web::WebSearchProvider;
use async_trait::async_trait;
use delve_core::{AppError, AppResult, RetrievalError};
use delve_knowledge::EmbeddingProvider;
use delve_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Generation client that replays queued answers.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    always_fail: bool,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a transient error.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if self.always_fail {
            return Err(AppError::Llm("connection refused".to_string()));
        }

        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Scripted answer [1].".to_string());

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
            done: true,
        })
    }
}

/// Web search backend with canned results per normalized query.
#[derive(Default)]
pub struct ScriptedWebSearch {
    results: HashMap<String, Vec<WebResult>>,
    fallback: Vec<WebResult>,
    delay: Option<Duration>,
    unavailable: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedWebSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, results: Vec<WebResult>) -> Self {
        self.results.insert(normalize_query(query), results);
        self
    }

    /// Results for any query without its own entry.
    pub fn with_fallback(mut self, results: Vec<WebResult>) -> Self {
        self.fallback = results;
        self
    }

    /// Sleep before answering, to trip the connector timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most searches that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearchProvider for ScriptedWebSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable {
            return Err(RetrievalError::SearchUnavailable("HTTP 503".to_string()).into());
        }

        let mut results = self
            .results
            .get(&normalize_query(query))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        results.truncate(max_results);
        Ok(results)
    }
}

/// A well-formed web result on an untrusted https site.
pub fn web_result(url: &str, title: &str, snippet: &str) -> WebResult {
    WebResult {
        title: title.to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
        published_at: None,
    }
}

/// Embedder with one dimension per topic word plus a constant tail.
///
/// Texts sharing topics are close; texts sharing none are nearly orthogonal.
#[derive(Debug)]
pub struct TopicEmbedder {
    topics: Vec<String>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    unavailable: bool,
}

impl TopicEmbedder {
    pub fn new(topics: &[&str]) -> Self {
        Self {
            topics: topics.iter().map(|t| t.to_lowercase()).collect(),
            calls: AtomicUsize::new(0),
            delay: None,
            unavailable: false,
        }
    }

    /// Sleep before every batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(topics: &[&str]) -> Self {
        Self {
            unavailable: true,
            ..Self::new(topics)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .topics
            .iter()
            .map(|topic| if lower.contains(topic.as_str()) { 1.0 } else { 0.0 })
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn provider_name(&self) -> &str {
        "topic"
    }

    fn model_name(&self) -> &str {
        "topic-test"
    }

    fn dimensions(&self) -> usize {
        self.topics.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(RetrievalError::EmbeddingServiceUnavailable("down".to_string()).into());
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}
