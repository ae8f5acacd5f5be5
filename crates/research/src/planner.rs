//! Tool routing: what the agent loop does next.
//!
//! [`decide`] is a pure function of the session so far. It never performs
//! I/O, which keeps every routing rule unit-testable without a runtime.

use crate::cache::normalize_query;
use crate::types::{ResearchStep, Source, StepStatus, ToolKind};
use delve_core::config::ResearchSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Four-digit years from 1900 to 2099.
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern is valid"));

/// Words dropped when deriving keyword queries.
const STOPWORDS: &[&str] = &[
    "about", "and", "are", "can", "could", "did", "does", "for", "from", "has", "have", "how",
    "into", "its", "the", "their", "there", "this", "was", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Why the planner stopped gathering evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Enough passing sources and no outstanding need for web results
    EnoughSources,
    IterationCap,
    /// Every query variant was tried or every attempt budget is spent
    NothingLeftToTry,
}

/// Next move of the agent loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerAction {
    LocalSearch { query: String },
    /// Queries issued concurrently within one step
    WebSearch { queries: Vec<String> },
    Synthesize { reason: StopReason },
}

/// Everything [`decide`] looks at.
#[derive(Debug, Clone, Copy)]
pub struct PlannerContext<'a> {
    pub question: &'a str,
    /// Quality-passing sources gathered so far
    pub sources: &'a [Source],
    pub steps: &'a [ResearchStep],
    pub settings: &'a ResearchSettings,
    pub web_available: bool,
    pub current_year: i32,
}

/// Pick the next action.
///
/// Rules, in order:
/// 1. stop at the iteration cap;
/// 2. stop once enough sources pass, unless the question asks for current
///    information and the web has not answered yet;
/// 3. search locally first;
/// 4. escalate to the web while it has untried queries and budget;
/// 5. fall back to further local variants while sources are short;
/// 6. otherwise stop with whatever was found.
pub fn decide(ctx: &PlannerContext<'_>) -> PlannerAction {
    let settings = ctx.settings;

    if ctx.steps.len() >= settings.max_iterations {
        return PlannerAction::Synthesize {
            reason: StopReason::IterationCap,
        };
    }

    let variants = query_variants(ctx.question);
    let local_tried = tried_queries(ctx.steps, ToolKind::LocalSearch);
    let web_tried = tried_queries(ctx.steps, ToolKind::WebSearch);
    let local_attempts = attempts(ctx.steps, ToolKind::LocalSearch);
    let web_attempts = attempts(ctx.steps, ToolKind::WebSearch);

    let enough = ctx.sources.len() >= settings.min_quality_sources;
    let external = needs_external(ctx.question, settings, ctx.current_year);
    let web_answered = ctx
        .steps
        .iter()
        .any(|s| s.tool == ToolKind::WebSearch && s.status == StepStatus::Ok);
    let web_budget_left = ctx.web_available && web_attempts < settings.max_web_attempts;
    let external_pending = external && web_budget_left && !web_answered;

    if enough && !external_pending {
        return PlannerAction::Synthesize {
            reason: StopReason::EnoughSources,
        };
    }

    if local_attempts == 0 {
        if let Some(query) = variants.first() {
            return PlannerAction::LocalSearch {
                query: query.clone(),
            };
        }
    }

    if web_budget_left && (!enough || external_pending) {
        let queries: Vec<String> = untried(&variants, &web_tried)
            .take(settings.web_queries_per_iteration.max(1))
            .cloned()
            .collect();
        if !queries.is_empty() {
            return PlannerAction::WebSearch { queries };
        }
    }

    if !enough && local_attempts < settings.max_local_attempts {
        if let Some(query) = untried(&variants, &local_tried).next() {
            return PlannerAction::LocalSearch {
                query: query.clone(),
            };
        }
    }

    PlannerAction::Synthesize {
        reason: StopReason::NothingLeftToTry,
    }
}

/// Queries derived from the question, most specific first, deduplicated
/// after normalization.
pub fn query_variants(question: &str) -> Vec<String> {
    let question = question.trim();
    let keywords = keywords(question);

    let mut candidates = vec![question.to_string()];
    if !keywords.is_empty() {
        candidates.push(keywords.clone());
        candidates.push(format!("{} explained", keywords));
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .filter(|q| seen.insert(normalize_query(q)))
        .collect()
}

/// Content words of the question in their original order.
pub fn keywords(question: &str) -> String {
    question
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the question asks for current or external information.
///
/// True when a recency keyword appears as a whole word (or phrase), or the
/// question names a year no older than last year.
pub fn needs_external(question: &str, settings: &ResearchSettings, current_year: i32) -> bool {
    let words: String = question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));

    let keyword_hit = settings.recency_keywords.iter().any(|kw| {
        let kw = normalize_query(kw);
        !kw.is_empty() && padded.contains(&format!(" {} ", kw))
    });
    if keyword_hit {
        return true;
    }

    YEAR_RE
        .find_iter(question)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .any(|year| year >= current_year - 1)
}

fn attempts(steps: &[ResearchStep], tool: ToolKind) -> usize {
    steps.iter().filter(|s| s.tool == tool).count()
}

fn tried_queries(steps: &[ResearchStep], tool: ToolKind) -> HashSet<String> {
    steps
        .iter()
        .filter(|s| s.tool == tool)
        .flat_map(|s| s.queries().map(normalize_query))
        .collect()
}

fn untried<'a>(
    variants: &'a [String],
    tried: &'a HashSet<String>,
) -> impl Iterator<Item = &'a String> + 'a {
    variants
        .iter()
        .filter(move |v| !tried.contains(&normalize_query(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provenance, QUERY_SEPARATOR};
    use chrono::Utc;

    const YEAR: i32 = 2026;

    fn step(tool: ToolKind, query: &str, status: StepStatus) -> ResearchStep {
        multi_step(tool, &[query], status)
    }

    fn multi_step(tool: ToolKind, queries: &[&str], status: StepStatus) -> ResearchStep {
        ResearchStep {
            sequence: 0,
            tool,
            query: queries.join(QUERY_SEPARATOR),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            summary: String::new(),
            status,
            cached: false,
            sources_added: 0,
            sources_excluded: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn sources(n: usize) -> Vec<Source> {
        (0..n)
            .map(|i| Source {
                provenance: Provenance::Web,
                title: format!("s{}", i),
                content: String::new(),
                chunk_id: None,
                url: Some(format!("https://example.com/{}", i)),
                published_at: None,
                quality: 0.6,
            })
            .collect()
    }

    fn ctx<'a>(
        question: &'a str,
        sources: &'a [Source],
        steps: &'a [ResearchStep],
        settings: &'a ResearchSettings,
        web_available: bool,
    ) -> PlannerContext<'a> {
        PlannerContext {
            question,
            sources,
            steps,
            settings,
            web_available,
            current_year: YEAR,
        }
    }

    #[test]
    fn test_local_first() {
        let settings = ResearchSettings::default();
        let action = decide(&ctx("How does photosynthesis work?", &[], &[], &settings, true));
        assert_eq!(
            action,
            PlannerAction::LocalSearch {
                query: "How does photosynthesis work?".to_string()
            }
        );
    }

    #[test]
    fn test_enough_local_sources_stop() {
        let settings = ResearchSettings::default();
        let steps = vec![step(ToolKind::LocalSearch, "q", StepStatus::Ok)];
        let found = sources(3);
        let action = decide(&ctx("How does photosynthesis work?", &found, &steps, &settings, true));
        assert_eq!(
            action,
            PlannerAction::Synthesize {
                reason: StopReason::EnoughSources
            }
        );
    }

    #[test]
    fn test_escalates_to_web_when_short() {
        let settings = ResearchSettings::default();
        let question = "How does photosynthesis work?";
        let steps = vec![step(ToolKind::LocalSearch, question, StepStatus::Ok)];
        let found = sources(1);
        match decide(&ctx(question, &found, &steps, &settings, true)) {
            PlannerAction::WebSearch { queries } => assert_eq!(queries, vec![question.to_string()]),
            other => panic!("expected web search, got {:?}", other),
        }
    }

    #[test]
    fn test_recency_question_goes_to_web_despite_enough_sources() {
        let settings = ResearchSettings::default();
        let question = "What is the latest photosynthesis research?";
        let steps = vec![step(ToolKind::LocalSearch, question, StepStatus::Ok)];
        let found = sources(4);
        assert!(matches!(
            decide(&ctx(question, &found, &steps, &settings, true)),
            PlannerAction::WebSearch { .. }
        ));

        // Once the web has answered, enough sources ends the loop
        let mut answered = steps.clone();
        answered.push(step(ToolKind::WebSearch, question, StepStatus::Ok));
        assert_eq!(
            decide(&ctx(question, &found, &answered, &settings, true)),
            PlannerAction::Synthesize {
                reason: StopReason::EnoughSources
            }
        );
    }

    #[test]
    fn test_web_retries_with_new_variant_after_timeout() {
        let settings = ResearchSettings::default();
        let question = "What is the latest photosynthesis research?";
        let steps = vec![
            step(ToolKind::LocalSearch, question, StepStatus::Ok),
            step(ToolKind::WebSearch, question, StepStatus::TimedOut),
        ];
        let found = sources(3);
        match decide(&ctx(question, &found, &steps, &settings, true)) {
            PlannerAction::WebSearch { queries } => {
                assert_eq!(queries, vec!["latest photosynthesis research".to_string()])
            }
            other => panic!("expected web search, got {:?}", other),
        }

        // Budget spent: stop with local evidence
        let mut exhausted = steps.clone();
        exhausted.push(step(
            ToolKind::WebSearch,
            "latest photosynthesis research",
            StepStatus::TimedOut,
        ));
        assert_eq!(
            decide(&ctx(question, &found, &exhausted, &settings, true)),
            PlannerAction::Synthesize {
                reason: StopReason::EnoughSources
            }
        );
    }

    #[test]
    fn test_no_web_falls_back_to_local_variants() {
        let settings = ResearchSettings::default();
        let question = "How does photosynthesis work?";
        let steps = vec![step(ToolKind::LocalSearch, question, StepStatus::Ok)];
        assert_eq!(
            decide(&ctx(question, &[], &steps, &settings, false)),
            PlannerAction::LocalSearch {
                query: "photosynthesis work".to_string()
            }
        );

        let mut spent = steps.clone();
        spent.push(step(ToolKind::LocalSearch, "photosynthesis work", StepStatus::Ok));
        assert_eq!(
            decide(&ctx(question, &[], &spent, &settings, false)),
            PlannerAction::Synthesize {
                reason: StopReason::NothingLeftToTry
            }
        );
    }

    #[test]
    fn test_iteration_cap() {
        let settings = ResearchSettings {
            max_iterations: 2,
            ..Default::default()
        };
        let steps = vec![
            step(ToolKind::LocalSearch, "a", StepStatus::Failed),
            step(ToolKind::WebSearch, "b", StepStatus::Failed),
        ];
        assert_eq!(
            decide(&ctx("anything at all", &[], &steps, &settings, true)),
            PlannerAction::Synthesize {
                reason: StopReason::IterationCap
            }
        );
    }

    #[test]
    fn test_parallel_web_queries_skip_tried_ones() {
        let settings = ResearchSettings {
            web_queries_per_iteration: 2,
            ..Default::default()
        };
        let question = "How does photosynthesis work?";
        let steps = vec![
            step(ToolKind::LocalSearch, question, StepStatus::Ok),
            multi_step(
                ToolKind::WebSearch,
                &[question, "photosynthesis work"],
                StepStatus::Failed,
            ),
        ];
        match decide(&ctx(question, &[], &steps, &settings, true)) {
            PlannerAction::WebSearch { queries } => {
                assert_eq!(queries, vec!["photosynthesis work explained".to_string()])
            }
            other => panic!("expected web search, got {:?}", other),
        }
    }

    #[test]
    fn test_question_containing_separator_is_not_repeated() {
        let settings = ResearchSettings::default();
        let question = "Is C | Rust faster?";
        let steps = vec![
            step(ToolKind::LocalSearch, question, StepStatus::Ok),
            step(ToolKind::WebSearch, question, StepStatus::Failed),
        ];
        match decide(&ctx(question, &[], &steps, &settings, true)) {
            PlannerAction::WebSearch { queries } => {
                assert_eq!(queries, vec!["rust faster".to_string()])
            }
            other => panic!("expected web search, got {:?}", other),
        }
    }

    #[test]
    fn test_query_variants() {
        let variants = query_variants("What is the Calvin cycle?");
        assert_eq!(
            variants,
            vec![
                "What is the Calvin cycle?".to_string(),
                "calvin cycle".to_string(),
                "calvin cycle explained".to_string(),
            ]
        );

        // Nothing left after stopword removal
        assert_eq!(query_variants("Who is it?"), vec!["Who is it?".to_string()]);
    }

    #[test]
    fn test_needs_external() {
        let settings = ResearchSettings::default();
        assert!(needs_external("What is the latest Rust release?", &settings, YEAR));
        assert!(needs_external("Rust news today", &settings, YEAR));
        assert!(needs_external("What happened this year in fusion?", &settings, YEAR));
        assert!(needs_external("Fusion milestones in 2025", &settings, YEAR));
        assert!(!needs_external("Fusion milestones in 1998", &settings, YEAR));
        // Whole words only
        assert!(!needs_external("How do snowflakes form?", &settings, YEAR));
        assert!(!needs_external("Explain currents in the ocean", &settings, YEAR));
    }
}
