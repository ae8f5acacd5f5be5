//! The per-session agent loop.
//!
//! Each iteration asks the planner for an action, runs the tool (cache
//! first), then folds the results into the session. The loop itself is
//! sequential; only the queries of a single web step run concurrently.

use crate::cache::ResultCache;
use crate::cancel::CancellationToken;
use crate::confidence;
use crate::planner::{self, PlannerAction, PlannerContext};
use crate::quality::QualityAssessor;
use crate::session::{FailureReason, ResearchSession, ResearchState};
use crate::synthesizer::{no_information_answer, Synthesizer, FALLBACK_ANSWER};
use crate::types::{
    Answer, ConfidenceLabel, ExcludedSource, Provenance, ResearchStep, Source, StepStatus,
    ToolKind, WebResult, QUERY_SEPARATOR,
};
use crate::web::{normalize_url, truncate_chars, WebSearchConnector};
use chrono::{Datelike, Utc};
use delve_core::config::ResearchSettings;
use delve_core::{AppError, AppResult, RetrievalError};
use delve_knowledge::{KnowledgeBase, ScoredChunk};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_SUMMARY_CHARS: usize = 500;

const ALL_TOOLS_FAILED_ANSWER: &str = "I was unable to gather any evidence for this question \
because every search failed. Please try again later.";

const CANCELLED_ANSWER: &str = "Research was cancelled before an answer was produced.";

/// A retrieved item waiting for evaluation.
enum Candidate {
    Local { scored: ScoredChunk, rank: usize },
    Web(WebResult),
}

/// Raw outcome of one tool invocation.
struct ToolRun {
    tool: ToolKind,
    queries: Vec<String>,
    status: StepStatus,
    cached: bool,
    candidates: Vec<Candidate>,
    errors: Vec<String>,
}

impl ToolRun {
    fn failed(tool: ToolKind, queries: Vec<String>, error: &AppError) -> Self {
        Self {
            tool,
            queries,
            status: if error.is_timeout() {
                StepStatus::TimedOut
            } else {
                StepStatus::Failed
            },
            cached: false,
            candidates: Vec::new(),
            errors: vec![error.to_string()],
        }
    }
}

/// Everything one session needs, shared across sessions by the engine.
pub struct ResearchAgent {
    pub(crate) knowledge: Arc<KnowledgeBase>,
    pub(crate) web: Option<WebSearchConnector>,
    pub(crate) local_cache: Arc<ResultCache<Vec<ScoredChunk>>>,
    pub(crate) web_cache: Arc<ResultCache<Vec<WebResult>>>,
    /// Process-wide cap on outbound tool calls
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) assessor: QualityAssessor,
    pub(crate) synthesizer: Synthesizer,
    pub(crate) settings: ResearchSettings,
    pub(crate) tool_timeout: Duration,
}

impl ResearchAgent {
    /// Run a full session for `question`.
    ///
    /// Tool and generation failures are absorbed into the returned session;
    /// an `Err` means the question itself was rejected.
    pub async fn run(&self, question: &str, cancel: &CancellationToken) -> AppResult<ResearchSession> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Question must not be empty".to_string()));
        }

        let mut session = ResearchSession::new(question);
        tracing::info!("Research {} started: {}", session.id, question);

        let mut seen = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Research {} cancelled after {} steps", session.id, session.steps.len());
                session.answer = Some(degraded_answer(CANCELLED_ANSWER));
                session.fail(FailureReason::Cancelled)?;
                return Ok(session);
            }

            let action = planner::decide(&PlannerContext {
                question,
                sources: &session.sources,
                steps: &session.steps,
                settings: &self.settings,
                web_available: self.web.is_some(),
                current_year: Utc::now().year(),
            });

            let run = match action {
                PlannerAction::Synthesize { reason } => {
                    tracing::info!(
                        "Research {} stops gathering: {:?} ({} sources, {} steps)",
                        session.id,
                        reason,
                        session.sources.len(),
                        session.steps.len()
                    );
                    break;
                }
                PlannerAction::LocalSearch { query } => {
                    session.transition(ResearchState::ToolCall)?;
                    self.local_search(query).await
                }
                PlannerAction::WebSearch { queries } => {
                    session.transition(ResearchState::ToolCall)?;
                    self.web_search(queries).await
                }
            };

            session.transition(ResearchState::Evaluating)?;
            let step = self.evaluate(&mut session, &mut seen, run);
            tracing::info!(
                "Research {} step {}: {} '{}' -> {} ({})",
                session.id,
                step.sequence,
                step.tool,
                step.query,
                step.status.as_str(),
                step.summary
            );
            session.transition(ResearchState::Planning)?;
        }

        session.transition(ResearchState::Synthesizing)?;
        self.conclude(&mut session).await?;
        Ok(session)
    }

    async fn local_search(&self, query: String) -> ToolRun {
        let k = self.settings.local_top_k;
        let timeout = self.tool_timeout;
        let text = query.as_str();

        let fetched = self
            .local_cache
            .get_or_fetch(ToolKind::LocalSearch, text, move || async move {
                let _permit = self.acquire().await?;
                match tokio::time::timeout(timeout, self.knowledge.search(text, k)).await {
                    Ok(result) => result,
                    Err(_) => Err(RetrievalError::Timeout {
                        operation: "local_search".to_string(),
                        millis: timeout.as_millis() as u64,
                    }
                    .into()),
                }
            })
            .await;

        match fetched {
            Ok((chunks, cached)) => ToolRun {
                tool: ToolKind::LocalSearch,
                queries: vec![query],
                status: StepStatus::Ok,
                cached,
                candidates: chunks
                    .into_iter()
                    .enumerate()
                    .map(|(rank, scored)| Candidate::Local { scored, rank })
                    .collect(),
                errors: Vec::new(),
            },
            Err(e) => {
                tracing::warn!("Local search failed for '{}': {}", query, e);
                ToolRun::failed(ToolKind::LocalSearch, vec![query], &e)
            }
        }
    }

    async fn web_search(&self, queries: Vec<String>) -> ToolRun {
        let Some(web) = &self.web else {
            let error = AppError::from(RetrievalError::SearchUnavailable(
                "web search is disabled".to_string(),
            ));
            return ToolRun::failed(ToolKind::WebSearch, queries, &error);
        };

        let max_results = self.settings.web_max_results;
        let outcomes = join_all(queries.iter().map(|query| async move {
            self.web_cache
                .get_or_fetch(ToolKind::WebSearch, query, move || async move {
                    let _permit = self.acquire().await?;
                    web.search(query, max_results).await
                })
                .await
        }))
        .await;

        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        let mut succeeded = 0;
        let mut all_cached = true;
        let mut all_timeouts = true;

        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok((results, cached)) => {
                    succeeded += 1;
                    all_cached &= cached;
                    candidates.extend(results.into_iter().map(Candidate::Web));
                }
                Err(e) => {
                    tracing::warn!("Web search failed for '{}': {}", query, e);
                    all_timeouts &= e.is_timeout();
                    errors.push(e.to_string());
                }
            }
        }

        let status = if succeeded > 0 {
            StepStatus::Ok
        } else if all_timeouts {
            StepStatus::TimedOut
        } else {
            StepStatus::Failed
        };

        ToolRun {
            tool: ToolKind::WebSearch,
            queries,
            status,
            cached: succeeded > 0 && all_cached,
            candidates,
            errors,
        }
    }

    async fn acquire(&self) -> AppResult<tokio::sync::SemaphorePermit<'_>> {
        self.limiter
            .acquire()
            .await
            .map_err(|_| AppError::Research("tool call limiter closed".to_string()))
    }

    /// Dedupe, score and record the results of one tool run.
    fn evaluate(
        &self,
        session: &mut ResearchSession,
        seen: &mut HashSet<String>,
        run: ToolRun,
    ) -> ResearchStep {
        let now = Utc::now();
        let total = run.candidates.len();
        let mut added = 0;
        let mut duplicates = 0;
        let mut excluded = Vec::new();

        for candidate in run.candidates {
            let (key, source) = match candidate {
                Candidate::Local { scored, rank } => {
                    let quality = self.assessor.score_local(scored.score, rank);
                    let chunk = scored.chunk;
                    (
                        format!("local:{}", chunk.id),
                        Source {
                            provenance: Provenance::Local,
                            title: chunk.id.document_id.clone(),
                            content: chunk.text,
                            chunk_id: Some(chunk.id),
                            url: None,
                            published_at: None,
                            quality,
                        },
                    )
                }
                Candidate::Web(result) => {
                    let quality = self.assessor.score_web(&result, now);
                    (
                        format!("web:{}", normalize_url(&result.url)),
                        Source {
                            provenance: Provenance::Web,
                            title: result.title,
                            content: result.snippet,
                            chunk_id: None,
                            url: Some(result.url),
                            published_at: result.published_at,
                            quality,
                        },
                    )
                }
            };

            if !seen.insert(key) {
                duplicates += 1;
                continue;
            }

            if self.assessor.passes(source.quality) {
                session.sources.push(source);
                added += 1;
            } else {
                excluded.push(ExcludedSource {
                    location: source.location(),
                    title: source.title,
                    quality: source.quality,
                });
            }
        }

        let mut summary = match run.status {
            StepStatus::Ok => format!(
                "{} new sources from {} results ({} below threshold, {} duplicates)",
                added,
                total,
                excluded.len(),
                duplicates
            ),
            StepStatus::TimedOut => "timed out".to_string(),
            StepStatus::Failed => "failed".to_string(),
        };
        if !run.errors.is_empty() {
            summary.push_str(": ");
            summary.push_str(&run.errors.join("; "));
        }

        let sequence = session.push_step(ResearchStep {
            sequence: 0,
            tool: run.tool,
            query: run.queries.join(QUERY_SEPARATOR),
            queries: run.queries,
            summary: truncate_chars(&summary, MAX_SUMMARY_CHARS),
            status: run.status,
            cached: run.cached,
            sources_added: added,
            sources_excluded: excluded,
            timestamp: now,
        });

        session.steps[sequence - 1].clone()
    }

    /// Produce the answer and move the session to its terminal state.
    async fn conclude(&self, session: &mut ResearchSession) -> AppResult<()> {
        if session.sources.is_empty() {
            let any_succeeded = session.steps.iter().any(|s| s.status == StepStatus::Ok);
            if !any_succeeded {
                tracing::warn!("Research {}: every tool call failed", session.id);
                session.answer = Some(degraded_answer(ALL_TOOLS_FAILED_ANSWER));
                return session.fail(FailureReason::AllToolsFailed);
            }

            tracing::info!("Research {}: no source passed the quality bar", session.id);
            session.answer = Some(Answer {
                content: no_information_answer(&session.question),
                citations: Vec::new(),
                confidence: ConfidenceLabel::VeryLow,
            });
            return session.transition(ResearchState::Done);
        }

        match self
            .synthesizer
            .synthesize(&session.question, &session.sources)
            .await
        {
            Ok(synthesis) => {
                session.citation_repairs = synthesis.repairs;
                session.answer = Some(Answer {
                    content: synthesis.content,
                    citations: synthesis.citations,
                    confidence: confidence::assess(&session.sources),
                });
                session.transition(ResearchState::Done)?;
                tracing::info!(
                    "Research {} done: {} sources, confidence {}",
                    session.id,
                    session.sources.len(),
                    session.confidence()
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Research {}: {}", session.id, e);
                session.answer = Some(degraded_answer(FALLBACK_ANSWER));
                session.fail(FailureReason::SynthesisUnavailable)
            }
        }
    }
}

fn degraded_answer(content: &str) -> Answer {
    Answer {
        content: content.to_string(),
        citations: Vec::new(),
        confidence: ConfidenceLabel::VeryLow,
    }
}
