//! Answer synthesis and citation validation.
//!
//! One generation call per session. The model's text is then checked so that
//! every `[n]` it cites resolves to a numbered source; anything else is
//! stripped and the repair recorded.

use crate::types::Source;
use delve_core::{retry_with_backoff, AppError, AppResult, RetryPolicy};
use delve_llm::{LlmClient, LlmRequest};
use delve_prompt::{build_prompt, load_prompt, SYNTHESIS_PROMPT_ID};
use regex::{Captures, Regex};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// `[1]`, `[2, 3]`, with an optional leading space so an emptied bracket
/// does not leave a gap before the punctuation.
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\s?)\[(\s*\d+\s*(?:,\s*\d+\s*)*)\]").expect("citation pattern is valid")
});

/// Returned when generation fails after retries.
pub const FALLBACK_ANSWER: &str = "I apologize, but I was unable to generate an answer to this \
question. The evidence gathered so far is listed in the sources and research steps.";

/// Answer used when tools ran but nothing passed the quality bar.
pub fn no_information_answer(question: &str) -> String {
    format!(
        "I could not find information about \"{}\" in the available documents or web results.",
        question.trim()
    )
}

/// Validated model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub content: String,
    /// Unique valid 1-based indices in order of first appearance
    pub citations: Vec<usize>,
    /// Human-readable description of each stripped citation
    pub repairs: Vec<String>,
}

/// Generation settings for the synthesizer.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Workspace prompt overrides
    pub prompts_dir: Option<PathBuf>,
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, options: SynthesisOptions) -> Self {
        Self { llm, options }
    }

    /// Generate a cited answer from `sources`.
    ///
    /// Any failure, including a broken prompt override, is reported as
    /// `AppError::Synthesis`.
    pub async fn synthesize(&self, question: &str, sources: &[Source]) -> AppResult<Synthesis> {
        let request = self
            .build_request(question, sources)
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        tracing::info!(
            "Generating answer with {} ({} sources)",
            self.llm.provider_name(),
            sources.len()
        );

        let llm = &self.llm;
        let request = &request;
        let timeout = self.options.timeout;

        let content = retry_with_backoff(self.options.retry, "generation", move || async move {
            let response = match tokio::time::timeout(timeout, llm.complete(request)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AppError::Llm(format!(
                        "generation timed out after {}ms",
                        timeout.as_millis()
                    )))
                }
            };

            if response.content.trim().is_empty() {
                return Err(AppError::Llm("generation returned empty text".to_string()));
            }
            if !response.done {
                tracing::warn!("Generation stopped early; the answer may be truncated");
            }
            Ok(response.content)
        })
        .await
        .map_err(|e| AppError::Synthesis(e.to_string()))?;

        let synthesis = validate_citations(content.trim(), sources.len());
        for repair in &synthesis.repairs {
            tracing::warn!("Citation repaired: {}", repair);
        }

        Ok(synthesis)
    }

    fn build_request(&self, question: &str, sources: &[Source]) -> AppResult<LlmRequest> {
        let definition = load_prompt(self.options.prompts_dir.as_deref(), SYNTHESIS_PROMPT_ID)?;

        let numbered: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                json!({
                    "index": i + 1,
                    "provenance": source.provenance.as_str(),
                    "title": source.title,
                    "content": source.content,
                })
            })
            .collect();

        let built = build_prompt(
            &definition,
            &json!({ "question": question, "sources": numbered }),
        )?;

        let mut request = LlmRequest::new(built.user, self.options.model.clone())
            .with_max_tokens(self.options.max_tokens)
            .with_temperature(self.options.temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        Ok(request)
    }
}

/// Keep only citations that resolve to one of `source_count` sources.
///
/// Invalid indices are removed from their bracket; a bracket left empty is
/// removed entirely.
pub fn validate_citations(text: &str, source_count: usize) -> Synthesis {
    let mut citations = Vec::new();
    let mut seen = HashSet::new();
    let mut repairs = Vec::new();

    let content = CITATION_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let leading = &caps[1];
            let mut kept = Vec::new();

            for raw in caps[2].split(',') {
                let raw = raw.trim();
                match raw.parse::<usize>() {
                    Ok(index) if (1..=source_count).contains(&index) => {
                        if seen.insert(index) {
                            citations.push(index);
                        }
                        kept.push(index.to_string());
                    }
                    _ => repairs.push(format!(
                        "removed [{}] (valid range 1..={})",
                        raw, source_count
                    )),
                }
            }

            if kept.is_empty() {
                String::new()
            } else {
                format!("{}[{}]", leading, kept.join(", "))
            }
        })
        .into_owned();

    Synthesis {
        content,
        citations,
        repairs,
    }
}
