//! End-to-end tests for the iteration controller against an unreachable
//! SPARQL endpoint (no network available in this environment): these cover
//! the loop's control-flow guarantees — dedup-driven early exit, the
//! score-improvement early stop, and "never panics/never raises" — without
//! depending on a live triple store.

use selfquery_core::config::EngineConfig;
use selfquery_core::engine::{STOP_MAX_ITERATIONS, STOP_NO_MEANINGFUL_IMPROVEMENT, STOP_NO_NEW_CANDIDATES};
use selfquery_core::llm::MockAdapter;
use selfquery_core::{EngineBuildError, SelfQueryEngine};

const UNREACHABLE_ENDPOINT: &str = "http://127.0.0.1:1/sparql";

#[test]
fn build_rejects_a_blank_endpoint() {
    let result = SelfQueryEngine::build(String::new(), EngineConfig::default());
    assert!(matches!(result, Err(EngineBuildError::MissingField("endpoint"))));
}

#[tokio::test]
async fn identical_lexical_candidates_each_iteration_stop_the_loop_early() {
    let cfg = EngineConfig {
        max_iterations: 5,
        enable_lexical_search: true,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();
    let adapter = MockAdapter::empty();

    let result = engine
        .process(&adapter, "mock-model", "who discovered radium", None)
        .await;

    assert_eq!(result.iterations_used, 2);
    assert_eq!(result.stop_reason, STOP_NO_NEW_CANDIDATES);
}

#[tokio::test]
async fn early_stop_triggers_once_score_improvement_flatlines() {
    let cfg = EngineConfig {
        max_iterations: 5,
        min_iterations_before_early_stop: 2,
        min_score_improvement: 0.02,
        enable_lexical_search: false,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();

    let responses = vec![
        r#"{"queries": ["SELECT ?s WHERE { ?s ?p <http://ex/1> } LIMIT 10"]}"#.to_string(),
        r#"{"queries": ["SELECT ?s WHERE { ?s ?p <http://ex/2> } LIMIT 10"]}"#.to_string(),
    ];
    let adapter = MockAdapter::new(responses);

    let result = engine.process(&adapter, "mock-model", "radium", None).await;

    assert_eq!(result.iterations_used, 2);
    assert_eq!(result.stop_reason, STOP_NO_MEANINGFUL_IMPROVEMENT);
    assert!(result.evidence.iter().all(|e| e.score == 0.0));
}

#[tokio::test]
async fn single_iteration_budget_exhausts_to_max_iterations_stop_reason() {
    let cfg = EngineConfig {
        max_iterations: 1,
        enable_lexical_search: false,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();
    let responses = vec![r#"{"queries": ["ASK WHERE { ?s ?p ?o }"]}"#.to_string()];
    let adapter = MockAdapter::new(responses);

    let result = engine.process(&adapter, "mock-model", "radium", None).await;

    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.stop_reason, STOP_MAX_ITERATIONS);
}

#[tokio::test]
async fn unreachable_endpoint_produces_failed_evidence_not_a_panic() {
    let cfg = EngineConfig {
        max_iterations: 1,
        enable_lexical_search: true,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();
    let adapter = MockAdapter::empty();

    let result = engine.process(&adapter, "mock-model", "marie curie", None).await;

    assert!(!result.evidence.is_empty());
    assert!(result.evidence.iter().all(|e| e.error.is_some()));
    assert!(result.evidence.iter().all(|e| e.score == 0.0 && e.preview.is_empty()));
}

#[tokio::test]
async fn progress_sink_receives_events_without_aborting_retrieval() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let cfg = EngineConfig {
        max_iterations: 1,
        enable_lexical_search: true,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();
    let adapter = MockAdapter::empty();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = seen.clone();
    let sink: selfquery_core::ProgressSink = Arc::new(move |_event| {
        seen2.fetch_add(1, Ordering::SeqCst);
    });

    let result = engine
        .process(&adapter, "mock-model", "marie curie", Some(sink))
        .await;

    assert!(seen.load(Ordering::SeqCst) > 0);
    assert_eq!(result.iterations_used, 1);
}

#[tokio::test]
async fn process_result_carries_schema_metadata_and_executed_queries() {
    let cfg = EngineConfig {
        max_iterations: 1,
        enable_lexical_search: false,
        ..EngineConfig::default()
    };
    let engine = SelfQueryEngine::build(UNREACHABLE_ENDPOINT.to_string(), cfg).unwrap();
    let responses = vec![r#"{"queries": ["ASK WHERE { ?s ?p ?o }"]}"#.to_string()];
    let adapter = MockAdapter::new(responses);

    let result = engine.process(&adapter, "mock-model", "radium", None).await;

    assert!(!result.schema_metadata.is_empty());
    assert_eq!(result.queries, vec!["ASK WHERE { ?s ?p ?o }".to_string()]);
}
