use super::*;
use crate::cancel::CancellationToken;
use crate::session::ResearchState;
use crate::types::{ConfidenceLabel, Provenance, StepStatus, ToolKind};

#[tokio::test]
async fn test_locally_answerable_question_never_touches_the_web() {
    let h = with_photosynthesis(
        ScriptedLlm::new(vec!["Plants turn light into chemical energy [1][2]."]),
        Some(ScriptedWebSearch::new()),
        |_| {},
    )
    .await;

    let outcome = h
        .engine
        .research("How does photosynthesis work?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ResearchState::Done);
    assert_eq!(h.web.as_ref().unwrap().calls(), 0);
    assert!(outcome.sources.len() >= 3);
    assert!(outcome.sources.iter().all(|s| s.provenance == Provenance::Local));
    assert!(outcome.confidence >= ConfidenceLabel::Medium);
    assert_eq!(outcome.citations, vec![1, 2]);

    assert_eq!(outcome.research_steps.len(), 1);
    let step = &outcome.research_steps[0];
    assert_eq!(step.sequence, 1);
    assert_eq!(step.tool, ToolKind::LocalSearch);
    assert_eq!(step.status, StepStatus::Ok);
    assert!(!step.cached);
}

#[tokio::test]
async fn test_identical_query_is_served_from_cache() {
    let h = with_photosynthesis(ScriptedLlm::new(Vec::new()), None, |_| {}).await;
    let cancel = CancellationToken::new();

    h.engine
        .research("How does photosynthesis work?", &cancel)
        .await
        .unwrap();
    let embeds_after_first = h.embedder.calls();

    let second = h
        .engine
        .research("  how does PHOTOSYNTHESIS work? ", &cancel)
        .await
        .unwrap();

    assert_eq!(h.embedder.calls(), embeds_after_first);
    assert!(second.research_steps[0].cached);
}

#[tokio::test]
async fn test_ingest_invalidates_cached_local_results() {
    let h = with_photosynthesis(ScriptedLlm::new(Vec::new()), None, |_| {}).await;
    let cancel = CancellationToken::new();

    h.engine
        .research("How does photosynthesis work?", &cancel)
        .await
        .unwrap();
    h.engine
        .ingest("volcano.txt", volcano_text().as_bytes(), None)
        .await
        .unwrap();

    let again = h
        .engine
        .research("How does photosynthesis work?", &cancel)
        .await
        .unwrap();
    assert!(!again.research_steps[0].cached);
}

#[tokio::test]
async fn test_citations_resolve_after_validation() {
    let h = with_photosynthesis(
        ScriptedLlm::new(vec!["Light drives it [1]. Chlorophyll matters [9]. Both [2, 12]."]),
        None,
        |_| {},
    )
    .await;

    let outcome = h
        .engine
        .research("How does photosynthesis work?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.citations, vec![1, 2]);
    assert!(!outcome.content.contains("[9]"));
    assert!(!outcome.content.contains("12"));
    assert!(outcome
        .citations
        .iter()
        .all(|&c| c >= 1 && c <= outcome.sources.len()));

    let session = h.engine.get_session(&outcome.research_id).await.unwrap();
    assert_eq!(session.citation_repairs.len(), 2);
}

#[tokio::test]
async fn test_deleted_document_is_never_returned() {
    let h = with_photosynthesis(ScriptedLlm::new(Vec::new()), None, |_| {}).await;
    h.engine
        .ingest("volcano.txt", volcano_text().as_bytes(), None)
        .await
        .unwrap();

    h.engine.delete_document("photosynthesis.txt").await.unwrap();

    let outcome = h
        .engine
        .research("How does photosynthesis work?", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.sources.iter().all(|s| {
        s.chunk_id
            .as_ref()
            .map(|id| id.document_id != "photosynthesis.txt")
            .unwrap_or(true)
    }));
    let documents = h.engine.list_documents().await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].name, "volcano.txt");
}

#[tokio::test]
async fn test_no_passing_sources_answers_without_generation() {
    let h = harness(
        TopicEmbedder::new(TOPICS),
        ScriptedLlm::new(Vec::new()),
        None,
        |_| {},
    );
    h.engine
        .ingest("volcano.txt", volcano_text().as_bytes(), None)
        .await
        .unwrap();

    let outcome = h
        .engine
        .research("How does photosynthesis work?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ResearchState::Done);
    assert!(outcome.sources.is_empty());
    assert!(outcome.content.contains("could not find information"));
    assert_eq!(outcome.confidence, ConfidenceLabel::VeryLow);
    assert_eq!(h.llm.calls(), 0);

    // Low-scoring chunks are traced, not used
    assert!(outcome
        .research_steps
        .iter()
        .any(|step| !step.sources_excluded.is_empty()));
}
