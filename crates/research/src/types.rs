//! Evidence, step and answer types shared by the research pipeline.

use chrono::{DateTime, Utc};
use delve_knowledge::ChunkId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provenance {
    Local,
    Web,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Web => "WEB",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tools the planner can route a query to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    LocalSearch,
    WebSearch,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalSearch => "local_search",
            Self::WebSearch => "web_search",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// One unit of evidence, scoped to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub provenance: Provenance,
    pub title: String,
    pub content: String,

    /// Set for local sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,

    /// Set for web sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub quality: f32,
}

impl Source {
    /// Human-readable location: chunk reference or URL.
    pub fn location(&self) -> String {
        match (&self.chunk_id, &self.url) {
            (Some(id), _) => id.to_string(),
            (None, Some(url)) => url.clone(),
            (None, None) => String::new(),
        }
    }

    /// The document or site this source belongs to, used for diversity.
    pub fn origin(&self) -> String {
        match (&self.chunk_id, &self.url) {
            (Some(id), _) => id.document_id.clone(),
            (None, Some(url)) => crate::web::host_of(url).unwrap_or_else(|| url.clone()),
            (None, None) => self.title.clone(),
        }
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    TimedOut,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// A retrieved item that did not reach the quality threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedSource {
    pub title: String,
    pub location: String,
    pub quality: f32,
}

/// One planner iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchStep {
    /// 1-based position in the session
    pub sequence: usize,
    pub tool: ToolKind,

    /// Display form of the input; parallel queries are joined with `" | "`
    pub query: String,

    /// Queries issued by this step, one per tool call
    #[serde(default)]
    pub queries: Vec<String>,

    pub summary: String,
    pub status: StepStatus,
    pub cached: bool,
    pub sources_added: usize,

    #[serde(default)]
    pub sources_excluded: Vec<ExcludedSource>,

    pub timestamp: DateTime<Utc>,
}

impl ResearchStep {
    /// Individual queries issued by this step.
    ///
    /// Sessions saved before queries were recorded separately fall back to
    /// the display query.
    pub fn queries(&self) -> impl Iterator<Item = &str> {
        let legacy = self.queries.is_empty().then_some(self.query.as_str());
        self.queries.iter().map(String::as_str).chain(legacy)
    }
}

/// Separator used when one step carries several queries.
pub const QUERY_SEPARATOR: &str = " | ";

/// Discrete, advisory confidence in an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final synthesized answer. Citations are 1-based indices into the
/// session's sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
    pub citations: Vec<usize>,
    pub confidence: ConfidenceLabel,
}

/// Path of a rendered report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHandle {
    pub research_id: String,
    pub path: std::path::PathBuf,
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_source(url: &str) -> Source {
        Source {
            provenance: Provenance::Web,
            title: "t".to_string(),
            content: "c".to_string(),
            chunk_id: None,
            url: Some(url.to_string()),
            published_at: None,
            quality: 0.5,
        }
    }

    #[test]
    fn test_source_origin() {
        assert_eq!(web_source("https://www.example.com/a").origin(), "example.com");

        let local = Source {
            provenance: Provenance::Local,
            chunk_id: Some(ChunkId::new("guide.md", 3)),
            url: None,
            ..web_source("unused")
        };
        assert_eq!(local.origin(), "guide.md");
        assert_eq!(local.location(), "guide.md#3");
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceLabel::Medium > ConfidenceLabel::Low);
        assert!(ConfidenceLabel::VeryHigh > ConfidenceLabel::High);
    }

    #[test]
    fn test_step_queries_keep_separator_text() {
        let step = ResearchStep {
            sequence: 1,
            tool: ToolKind::WebSearch,
            query: "a | b | a or b".to_string(),
            queries: vec!["a | b".to_string(), "a or b".to_string()],
            summary: String::new(),
            status: StepStatus::Ok,
            cached: false,
            sources_added: 0,
            sources_excluded: Vec::new(),
            timestamp: Utc::now(),
        };
        let queries: Vec<&str> = step.queries().collect();
        assert_eq!(queries, vec!["a | b", "a or b"]);
    }

    #[test]
    fn test_step_without_recorded_queries_uses_display_query() {
        let json = serde_json::json!({
            "sequence": 1,
            "tool": "local_search",
            "query": "rust async",
            "summary": "",
            "status": "ok",
            "cached": false,
            "sources_added": 0,
            "timestamp": "2026-03-14T09:30:00Z"
        });
        let step: ResearchStep = serde_json::from_value(json).unwrap();
        assert_eq!(step.queries().collect::<Vec<_>>(), vec!["rust async"]);
    }

    #[test]
    fn test_serde_tags() {
        assert_eq!(serde_json::to_value(Provenance::Local).unwrap(), "LOCAL");
        assert_eq!(serde_json::to_value(StepStatus::TimedOut).unwrap(), "timed_out");
        assert_eq!(serde_json::to_value(ConfidenceLabel::VeryLow).unwrap(), "very_low");
    }
}
