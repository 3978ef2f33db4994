//! Contradiction Detection Integration Tests
//!
//! Candidate retrieval, analyzers, and auto-linking against the reference
//! record store.

use std::sync::Arc;

use knowledge_engine::services::contradiction::CandidateSource;
use knowledge_engine::{
    AutoLinkPolicy, ContradictionAnalyzer, EmbeddingProvider, EngineConfig, HeuristicAnalyzer,
    LinkDirection, LlmContradictionAnalyzer, RecordForAnalysis, RecordKind,
};

use crate::common::{FlagEverything, Harness, KeyedProvider, NeedleJudge};

/// A new Friday-deploy decision plus two older records sharing its words.
fn friday_harness() -> Harness {
    let h = Harness::new();
    h.records
        .add_record_with_id("d_old", RecordKind::Decision, "never deploy on friday")
        .unwrap();
    h.records
        .add_record_with_id("i_old", RecordKind::Idea, "friday demo sessions")
        .unwrap();
    h.records
        .add_record_with_id("d_new", RecordKind::Decision, "deploy every friday")
        .unwrap();
    h
}

fn analysis_record(id: &str) -> RecordForAnalysis {
    RecordForAnalysis {
        id: id.to_string(),
        kind: RecordKind::Decision,
        content: format!("statement {}", id),
        created_at: None,
    }
}

// ============================================================================
// Self exclusion
// ============================================================================

#[tokio::test]
async fn test_new_record_is_not_its_own_candidate_without_provider() {
    let h = friday_harness();
    let engine = h.engine(None);

    let outcome = engine
        .auto_check_contradictions_with(
            "d_new",
            RecordKind::Decision,
            "deploy every friday",
            &FlagEverything,
            AutoLinkPolicy::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.candidates_considered, 2);
    assert!(outcome.findings.iter().all(|f| f.candidate.id != "d_new"));
    let mut linked = outcome.linked_ids.clone();
    linked.sort();
    assert_eq!(linked, vec!["d_old", "i_old"]);

    let links = engine.get_contradicting_records("d_new").unwrap();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.id != "d_new"));
}

#[tokio::test]
async fn test_new_record_excluded_when_semantic_path_is_empty() {
    let h = friday_harness();
    let provider = Arc::new(KeyedProvider::new(&[], vec![1.0, 0.0]));
    let engine = h.engine(Some(provider.clone() as Arc<dyn EmbeddingProvider>));

    // No vectors are stored, so candidate finding falls back to keywords.
    let outcome = engine
        .auto_check_contradictions_with(
            "d_new",
            RecordKind::Decision,
            "deploy every friday",
            &FlagEverything,
            AutoLinkPolicy::default(),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.candidates_considered, 2);
    assert!(!outcome.linked_ids.contains(&"d_new".to_string()));
}

#[tokio::test]
async fn test_embedded_new_record_still_finds_keyword_matches() {
    let h = friday_harness();
    // The pipeline has already embedded the new record, and nothing else.
    h.embeddings
        .store_embedding("d_new", RecordKind::Decision, &[1.0, 0.0], "keyed-v1")
        .unwrap();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeyedProvider::new(&[], vec![1.0, 0.0]));
    let engine = h.engine(Some(provider));

    let outcome = engine
        .auto_check_contradictions_with(
            "d_new",
            RecordKind::Decision,
            "deploy every friday",
            &FlagEverything,
            AutoLinkPolicy::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.candidates_considered, 2);
    let mut linked = outcome.linked_ids.clone();
    linked.sort();
    assert_eq!(linked, vec!["d_old", "i_old"]);
}

#[tokio::test]
async fn test_stub_analyzer_result_counts() {
    let analyzer = HeuristicAnalyzer::new();
    let record = analysis_record("d_1");

    let others: Vec<RecordForAnalysis> = ["d_2", "d_3", "d_4", "d_5"]
        .iter()
        .map(|id| analysis_record(id))
        .collect();
    let findings = analyzer.find_contradictions(&record, &others).await.unwrap();
    assert_eq!(findings.len(), 4);
    assert!(findings.iter().all(|f| !f.result.is_contradiction));

    let mut with_self = others.clone();
    with_self.insert(2, record.clone());
    let findings = analyzer.find_contradictions(&record, &with_self).await.unwrap();
    assert_eq!(findings.len(), 4);
    assert!(findings.iter().all(|f| f.candidate.id != "d_1"));
}

#[tokio::test]
async fn test_model_analyzer_never_returns_self() {
    let analyzer = LlmContradictionAnalyzer::new(Arc::new(NeedleJudge::new("statement", 1.0)));
    let record = analysis_record("d_1");
    let candidates = vec![analysis_record("d_1"), analysis_record("d_2")];

    let findings = analyzer
        .find_contradictions(&record, &candidates)
        .await
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].candidate.id, "d_2");
}

// ============================================================================
// Model-backed auto-link
// ============================================================================

#[tokio::test]
async fn test_model_verdict_creates_directed_link() {
    let h = friday_harness();
    let analyzer = LlmContradictionAnalyzer::new(Arc::new(NeedleJudge::new("never", 0.9)));
    let engine = h.engine_with(EngineConfig::default(), None, Arc::new(analyzer));

    let outcome = engine
        .auto_check_contradictions("d_new", RecordKind::Decision, "deploy every friday")
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].candidate.id, "d_old");
    assert_eq!(outcome.linked_ids, vec!["d_old"]);

    let from_new = engine.get_contradicting_records("d_new").unwrap();
    assert_eq!(from_new.len(), 1);
    assert_eq!(from_new[0].id, "d_old");
    assert_eq!(from_new[0].kind, RecordKind::Decision);
    assert_eq!(from_new[0].direction, LinkDirection::Outgoing);

    let from_old = engine.get_contradicting_records("d_old").unwrap();
    assert_eq!(from_old.len(), 1);
    assert_eq!(from_old[0].id, "d_new");
    assert_eq!(from_old[0].direction, LinkDirection::Incoming);
}

#[tokio::test]
async fn test_low_confidence_verdict_is_not_linked() {
    let h = friday_harness();
    let analyzer = LlmContradictionAnalyzer::new(Arc::new(NeedleJudge::new("never", 0.5)));
    let engine = h.engine_with(EngineConfig::default(), None, Arc::new(analyzer));

    let outcome = engine
        .auto_check_contradictions("d_new", RecordKind::Decision, "deploy every friday")
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 1);
    assert!(outcome.linked_ids.is_empty());
    assert!(engine.get_contradicting_records("d_new").unwrap().is_empty());
}

#[tokio::test]
async fn test_auto_link_disabled_in_config() {
    let h = friday_harness();
    let mut config = EngineConfig::default();
    config.contradiction.auto_link = false;
    let engine = h.engine_with(config, None, Arc::new(FlagEverything));

    let outcome = engine
        .auto_check_contradictions("d_new", RecordKind::Decision, "deploy every friday")
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 2);
    assert!(outcome.linked_ids.is_empty());
}

// ============================================================================
// Kind threading
// ============================================================================

#[tokio::test]
async fn test_semantic_candidates_carry_their_kind() {
    let h = Harness::new();
    h.records
        .add_record_with_id("note-42", RecordKind::Idea, "ship on the last day of the week")
        .unwrap();
    h.records
        .add_record_with_id("rule-7", RecordKind::Decision, "freeze deploys before weekends")
        .unwrap();
    h.embeddings
        .store_embedding("note-42", RecordKind::Idea, &[0.95, 0.05], "keyed-v1")
        .unwrap();
    h.embeddings
        .store_embedding("rule-7", RecordKind::Decision, &[0.9, 0.2], "keyed-v1")
        .unwrap();

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeyedProvider::new(
        &[("we deploy on fridays", vec![1.0, 0.0])],
        vec![0.0, 1.0],
    ));
    let engine = h.engine_with(EngineConfig::default(), Some(provider), Arc::new(FlagEverything));

    let candidates = engine
        .find_potential_contradictions("we deploy on fridays", None, &engine.contradiction_options())
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates
        .iter()
        .all(|c| c.source == CandidateSource::Semantic));

    engine
        .auto_check_contradictions("x-new", RecordKind::Decision, "we deploy on fridays")
        .await
        .unwrap();

    let mut links = engine.get_contradicting_records("x-new").unwrap();
    links.sort_by(|a, b| a.id.cmp(&b.id));
    let kinds: Vec<(&str, RecordKind)> = links.iter().map(|l| (l.id.as_str(), l.kind)).collect();
    assert_eq!(
        kinds,
        vec![("note-42", RecordKind::Idea), ("rule-7", RecordKind::Decision)]
    );
}
