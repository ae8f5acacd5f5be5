//! Configuration management for Delve.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.delve/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all state stored in `.delve/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

/// Name of the state directory inside the workspace.
pub const STATE_DIR: &str = ".delve";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .delve/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Text generation backend
    pub llm: LlmSettings,

    /// Embedding backend
    pub embedding: EmbeddingSettings,

    /// Document splitting parameters
    pub chunking: ChunkingSettings,

    /// Planner and tool routing policy
    pub research: ResearchSettings,

    /// Result cache sizing
    pub cache: CacheSettings,

    /// Retry policy for external calls
    pub retry: RetrySettings,

    /// Web search backend
    pub web: WebSettings,
}

/// Generation capability settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    /// "ollama", "openai" or "groq" (any OpenAI-compatible endpoint)
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            timeout_secs: 60,
        }
    }
}

/// Embedding capability settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// "ollama" or "hash"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

/// Chunk Store parameters, in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Planner, assessor and synthesis policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResearchSettings {
    /// Hard cap on planner iterations (and therefore steps) per session
    pub max_iterations: usize,
    /// Passing sources needed before the planner stops escalating
    pub min_quality_sources: usize,
    /// Sources scoring below this are excluded from synthesis
    pub quality_threshold: f32,
    pub local_top_k: usize,
    pub web_max_results: usize,
    /// Web queries issued concurrently within one iteration
    pub web_queries_per_iteration: usize,
    pub max_web_attempts: usize,
    pub max_local_attempts: usize,
    /// Process-wide cap on simultaneous outbound tool calls
    pub max_concurrent_tool_calls: usize,
    pub tool_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// High-trust domains, matched as suffixes of the host
    pub trusted_domains: Vec<String>,
    /// Words that mark a question as needing current information
    pub recency_keywords: Vec<String>,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            min_quality_sources: 3,
            quality_threshold: 0.4,
            local_top_k: 5,
            web_max_results: 3,
            web_queries_per_iteration: 1,
            max_web_attempts: 2,
            max_local_attempts: 2,
            max_concurrent_tool_calls: 4,
            tool_timeout_secs: 10,
            generation_timeout_secs: 60,
            max_tokens: 4000,
            temperature: 0.1,
            trusted_domains: [
                "wikipedia.org",
                "arxiv.org",
                "nature.com",
                "science.org",
                "acm.org",
                "ieee.org",
                "nih.gov",
                "who.int",
                ".gov",
                ".edu",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            recency_keywords: [
                "latest",
                "current",
                "currently",
                "today",
                "recent",
                "recently",
                "news",
                "now",
                "this year",
                "upcoming",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ResearchSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Result cache sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            capacity: 256,
        }
    }
}

/// Retry settings for embedding, search and generation calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_backoff_ms))
    }
}

/// Web search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSettings {
    /// "searxng", "duckduckgo" or "none"
    pub provider: String,
    pub endpoint: Option<String>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            provider: "duckduckgo".to_string(),
            endpoint: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    chunking: Option<ChunkingSettings>,
    research: Option<ResearchSettings>,
    cache: Option<CacheSettings>,
    retry: Option<RetrySettings>,
    web: Option<WebSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            chunking: ChunkingSettings::default(),
            research: ResearchSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            web: WebSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `DELVE_WORKSPACE`: Override workspace path
    /// - `DELVE_CONFIG`: Path to config file
    /// - `DELVE_PROVIDER`: Generation provider
    /// - `DELVE_MODEL`: Generation model
    /// - `DELVE_EMBEDDING_PROVIDER`: Embedding provider
    /// - `DELVE_WEB_PROVIDER`: Web search provider
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use delve_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("DELVE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("DELVE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("DELVE_PROVIDER") {
            config.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("DELVE_MODEL") {
            config.llm.model = model;
        }

        if let Ok(provider) = std::env::var("DELVE_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        if let Ok(provider) = std::env::var("DELVE_WEB_PROVIDER") {
            config.web.provider = provider;
        }

        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = file.embedding {
            result.embedding = embedding;
        }
        if let Some(chunking) = file.chunking {
            result.chunking = chunking;
        }
        if let Some(research) = file.research {
            result.research = research;
        }
        if let Some(cache) = file.cache {
            result.cache = cache;
        }
        if let Some(retry) = file.retry {
            result.retry = retry;
        }
        if let Some(web) = file.web {
            result.web = web;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .delve directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Directory holding the index snapshot.
    pub fn index_dir(&self) -> PathBuf {
        self.state_dir().join("index")
    }

    /// Directory holding completed research sessions.
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir().join("sessions")
    }

    /// Directory holding rendered report artifacts.
    pub fn reports_dir(&self) -> PathBuf {
        self.state_dir().join("reports")
    }

    /// Directory holding user prompt overrides.
    pub fn prompts_dir(&self) -> PathBuf {
        self.state_dir().join("prompts")
    }

    /// Ensure the .delve directory tree exists.
    pub fn ensure_state_dirs(&self) -> AppResult<()> {
        for dir in [
            self.state_dir(),
            self.index_dir(),
            self.sessions_dir(),
            self.reports_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    AppError::Config(format!("Failed to create {:?}: {}", dir, e))
                })?;
            }
        }
        Ok(())
    }

    /// Resolve the generation API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.llm
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
    }

    /// Validate provider names and numeric ranges.
    pub fn validate(&self) -> AppResult<()> {
        let known_llm = ["ollama", "openai", "groq"];
        if !known_llm.contains(&self.llm.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                known_llm.join(", ")
            )));
        }

        if self.llm.provider != "ollama" {
            match &self.llm.api_key_env {
                Some(var) if std::env::var(var).is_ok() => {}
                Some(var) => {
                    return Err(AppError::Config(format!(
                        "API key not found in environment variable: {}",
                        var
                    )))
                }
                None => {
                    return Err(AppError::Config(
                        format!("Provider '{}' requires llm.apiKeyEnv", self.llm.provider),
                    ))
                }
            }
        }

        let known_embedding = ["ollama", "hash"];
        if !known_embedding.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                known_embedding.join(", ")
            )));
        }

        let known_web = ["searxng", "duckduckgo", "none"];
        if !known_web.contains(&self.web.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown web provider: {}. Supported: {}",
                self.web.provider,
                known_web.join(", ")
            )));
        }

        if self.web.provider == "searxng" && self.web.endpoint.is_none() {
            return Err(AppError::Config(
                "Web provider 'searxng' requires web.endpoint".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }

        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(AppError::Config(format!(
                "chunking.chunkOverlap ({}) must be smaller than chunking.chunkSize ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        let research = &self.research;
        if research.max_iterations == 0 {
            return Err(AppError::Config(
                "research.maxIterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&research.quality_threshold) {
            return Err(AppError::Config(format!(
                "research.qualityThreshold must be within [0, 1], got {}",
                research.quality_threshold
            )));
        }
        if research.max_concurrent_tool_calls == 0 || research.web_queries_per_iteration == 0 {
            return Err(AppError::Config(
                "research.maxConcurrentToolCalls and webQueriesPerIteration must be positive"
                    .to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(AppError::Config("cache.capacity must be positive".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
