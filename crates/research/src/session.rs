//! Research session record and its lifecycle state machine.

use crate::types::{Answer, ConfidenceLabel, ResearchStep, Source};
use chrono::{DateTime, Utc};
use delve_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a session.
///
/// ```text
/// PLANNING -> TOOL_CALL -> EVALUATING -> PLANNING
///     |                        |
///     +-----> SYNTHESIZING <---+ -> DONE
/// ```
/// `FAILED` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResearchState {
    Planning,
    ToolCall,
    Evaluating,
    Synthesizing,
    Done,
    Failed,
}

impl ResearchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::ToolCall => "TOOL_CALL",
            Self::Evaluating => "EVALUATING",
            Self::Synthesizing => "SYNTHESIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: ResearchState) -> bool {
        use ResearchState::*;

        match (*self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Planning, ToolCall) | (Planning, Synthesizing) => true,
            (ToolCall, Evaluating) => true,
            (Evaluating, Planning) | (Evaluating, Synthesizing) => true,
            (Synthesizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ResearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended in `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every tool call failed and no evidence was gathered
    AllToolsFailed,
    /// Answer generation failed after retries
    SynthesisUnavailable,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllToolsFailed => "all_tools_failed",
            Self::SynthesisUnavailable => "synthesis_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A research session: the source of truth for answers and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub question: String,
    pub state: ResearchState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,

    pub steps: Vec<ResearchStep>,

    /// Deduplicated, quality-passing sources in the order they were found
    pub sources: Vec<Source>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,

    /// Citation repairs applied to the generated text
    #[serde(default)]
    pub citation_repairs: Vec<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchSession {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.into(),
            state: ResearchState::Planning,
            failure_reason: None,
            steps: Vec::new(),
            sources: Vec::new(),
            answer: None,
            citation_repairs: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: ResearchState) -> AppResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::Research(format!(
                "Illegal transition {} -> {} for session {}",
                self.state, next, self.id
            )));
        }

        tracing::debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminate the session as failed.
    pub fn fail(&mut self, reason: FailureReason) -> AppResult<()> {
        self.transition(ResearchState::Failed)?;
        self.failure_reason = Some(reason);
        Ok(())
    }

    /// Append a step, assigning its sequence number.
    pub fn push_step(&mut self, mut step: ResearchStep) -> usize {
        step.sequence = self.steps.len() + 1;
        self.steps.push(step);
        self.steps.len()
    }

    pub fn confidence(&self) -> ConfidenceLabel {
        self.answer
            .as_ref()
            .map(|a| a.confidence)
            .unwrap_or(ConfidenceLabel::VeryLow)
    }
}

/// What `research` hands back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub research_id: String,
    pub content: String,
    pub sources: Vec<Source>,
    pub citations: Vec<usize>,
    pub confidence: ConfidenceLabel,
    pub research_steps: Vec<ResearchStep>,
    pub status: ResearchState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl From<&ResearchSession> for ResearchOutcome {
    fn from(session: &ResearchSession) -> Self {
        let (content, citations) = match &session.answer {
            Some(answer) => (answer.content.clone(), answer.citations.clone()),
            None => (String::new(), Vec::new()),
        };

        Self {
            research_id: session.id.clone(),
            content,
            sources: session.sources.clone(),
            citations,
            confidence: session.confidence(),
            research_steps: session.steps.clone(),
            status: session.state,
            failure_reason: session.failure_reason,
        }
    }
}

/// One line of `delve sessions list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub research_id: String,
    pub question: String,
    pub status: ResearchState,
    pub confidence: ConfidenceLabel,
    pub created_at: DateTime<Utc>,
}

impl From<&ResearchSession> for SessionSummary {
    fn from(session: &ResearchSession) -> Self {
        Self {
            research_id: session.id.clone(),
            question: session.question.clone(),
            status: session.state,
            confidence: session.confidence(),
            created_at: session.created_at,
        }
    }
}
