//! Markdown rendering of completed sessions.

use crate::session::ResearchSession;
use delve_core::{AppError, AppResult};
use delve_prompt::{load_prompt, render_template, REPORT_TEMPLATE_ID};
use serde_json::{json, Value};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Render `session` with the `research.report` template.
///
/// Only terminal sessions can be rendered. The session is not modified.
pub fn render_report(session: &ResearchSession, prompts_dir: Option<&Path>) -> AppResult<String> {
    if !session.state.is_terminal() {
        return Err(AppError::Research(format!(
            "Session {} is still {}",
            session.id, session.state
        )));
    }

    let definition = load_prompt(prompts_dir, REPORT_TEMPLATE_ID)?;
    render_template(&definition.template, &report_context(session))
}

/// Suggested download name: `research_report_<YYYY-MM-DD>_<id8>.md`.
pub fn report_file_name(session: &ResearchSession) -> String {
    let short_id: String = session.id.chars().take(8).collect();
    format!(
        "research_report_{}_{}.md",
        session.created_at.format("%Y-%m-%d"),
        short_id
    )
}

fn report_context(session: &ResearchSession) -> Value {
    let answer = session
        .answer
        .as_ref()
        .map(|a| a.content.clone())
        .unwrap_or_else(|| "No answer was produced.".to_string());

    let status = match session.failure_reason {
        Some(reason) => format!("{} ({})", session.state, reason.as_str()),
        None => session.state.to_string(),
    };

    let sources: Vec<Value> = session
        .sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            json!({
                "index": i + 1,
                "provenance": source.provenance.as_str(),
                "title": source.title,
                "location": source.location(),
                "quality": format!("{:.2}", source.quality),
            })
        })
        .collect();

    let steps: Vec<Value> = session
        .steps
        .iter()
        .map(|step| {
            json!({
                "sequence": step.sequence,
                "tool": step.tool.as_str(),
                "query": step.query,
                "status": step.status.as_str(),
                "cached": step.cached,
                "summary": step.summary,
            })
        })
        .collect();

    json!({
        "question": session.question,
        "answer": answer,
        "research_id": session.id,
        "status": status,
        "created_at": session.created_at.format(TIMESTAMP_FORMAT).to_string(),
        "completed_at": session
            .completed_at
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string()),
        "confidence": session.confidence().as_str(),
        "source_count": session.sources.len(),
        "sources": sources,
        "step_count": session.steps.len(),
        "steps": steps,
    })
}
