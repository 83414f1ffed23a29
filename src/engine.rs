//! Iteration Controller (spec §4.G): `SelfQueryEngine::build` / `process`.
//! The per-request state machine mirrors
//! `original_source/.../selfquery_llm.py::SelfQueryLLM.process` step for
//! step, with each helper kept as a private method the way the teacher keeps
//! `QueryResolver`'s helpers private.

use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::EngineBuildError;
use crate::lexical;
use crate::llm::LlmAdapter;
use crate::packer::{self, QueryEvidence};
use crate::planner;
use crate::progress::{self, ProgressEvent, ProgressSink, ProgressStage};
use crate::schema::{SchemaContext, SchemaLoader};
use crate::scorer;
use crate::sparql::endpoint::{EndpointDriver, SparqlPayload};
use crate::sparql::validator::{self, QueryType};

/// Closed set of stop reasons spec §4.G / §8 names.
pub const STOP_MAX_ITERATIONS: &str = "max_iterations";
pub const STOP_NO_NEW_CANDIDATES: &str = "no_new_candidates";
pub const STOP_NO_MEANINGFUL_IMPROVEMENT: &str = "no_meaningful_improvement";
pub const STOP_GLOBAL_TIME_BUDGET: &str = "global_time_budget";

/// Everything `process()` hands back (spec §4.I final returned object).
/// Never wrapped in `Result` — per spec §7, retrieval itself never raises
/// once the engine is built.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessResult {
    /// Cached schema metadata JSON text fed to the planner this call.
    pub schema_metadata: String,
    /// Every deduplicated candidate query executed across all iterations.
    pub queries: Vec<String>,
    /// Top-`top_k` evidence records, sorted by score descending.
    pub evidence: Vec<QueryEvidence>,
    /// The packed context string ready for injection into an answer prompt.
    pub context: String,
    pub iterations_used: usize,
    pub stop_reason: String,
}

/// Normalize query text for the seen-set: collapse whitespace, lowercase.
/// Mirrors `_normalize_query`.
fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Truncate a query to a short one-line preview for `iteration_candidates`'
/// `query_previews` payload.
fn compact_preview(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > 120 {
        collapsed.chars().take(117).collect::<String>() + "..."
    } else {
        collapsed
    }
}

/// The retrieval engine for one configured SPARQL endpoint. `process` takes
/// `&self` (not `&mut self`): a single engine can serve concurrent requests,
/// since all per-request state lives on that call's stack, not in the
/// engine itself. The schema cache is the only shared state and is
/// write-once, so `OnceCell` keeps it safe under concurrent access.
#[derive(Debug)]
pub struct SelfQueryEngine {
    config: EngineConfig,
    driver: EndpointDriver,
    schema_cache: OnceCell<SchemaContext>,
}

impl SelfQueryEngine {
    /// Build an engine for `endpoint`. The only error path a caller of this
    /// crate sees; once built, `process` never fails.
    pub fn build(endpoint: String, config: EngineConfig) -> Result<Self, EngineBuildError> {
        if endpoint.trim().is_empty() {
            return Err(EngineBuildError::MissingField("endpoint"));
        }
        let config = config.normalize();
        let driver = EndpointDriver::new(&endpoint, config.timeout_sec, config.max_triples);
        Ok(Self {
            config,
            driver,
            schema_cache: OnceCell::new(),
        })
    }

    async fn load_schema_context(&self) -> &SchemaContext {
        self.schema_cache
            .get_or_init(|| async { SchemaLoader::load(&self.driver, &self.config).await })
            .await
    }

    fn global_budget_reached(&self, start: Instant) -> bool {
        start.elapsed().as_secs() >= self.config.global_time_budget_sec
    }

    /// Ask the planner and the lexical generator for this iteration's
    /// candidate queries, deduplicated against everything already seen.
    /// Returns `(planner_count, lexical_count, deduped_candidates)`.
    #[allow(clippy::too_many_arguments)]
    async fn plan_iteration_candidates(
        &self,
        adapter: &dyn LlmAdapter,
        model_id: &str,
        question: &str,
        schema: &SchemaContext,
        iteration: usize,
        prior_preview: &str,
        seen: &std::collections::HashSet<String>,
    ) -> (usize, usize, Vec<String>) {
        let planner_candidates =
            planner::invoke(adapter, model_id, question, schema, &self.config, iteration, prior_preview).await;
        let lexical_candidates = if self.config.enable_lexical_search {
            lexical::build_candidates(question, &self.config)
        } else {
            Vec::new()
        };

        let planner_count = planner_candidates.len();
        let lexical_count = lexical_candidates.len();

        let mut deduped = Vec::new();
        let mut local_seen = seen.clone();
        for candidate in planner_candidates.into_iter().chain(lexical_candidates) {
            let key = normalize_query(&candidate);
            if local_seen.insert(key) {
                deduped.push(candidate);
            }
        }
        (planner_count, lexical_count, deduped)
    }

    /// Validate and execute each candidate query in sequence (spec §5:
    /// sequential within one iteration), producing one `QueryEvidence` per
    /// candidate.
    async fn execute_iteration_candidates(&self, candidates: &[String], question: &str) -> Vec<QueryEvidence> {
        let mut evidence = Vec::with_capacity(candidates.len());
        for query in candidates {
            let qtype = match validator::validate(query, &self.config) {
                Ok(qtype) => qtype,
                Err(reason) => {
                    evidence.push(QueryEvidence::failed(query.clone(), QueryType::Unknown, reason));
                    continue;
                }
            };

            let format = if qtype == QueryType::Construct {
                crate::sparql::endpoint::SparqlFormat::Turtle
            } else {
                crate::sparql::endpoint::SparqlFormat::Json
            };
            match self.driver.execute(query, format, question).await {
                Ok(payload) => {
                    let (preview, score) = score_payload(&payload, question, &self.config);
                    evidence.push(QueryEvidence::success(query.clone(), qtype, preview, score));
                }
                Err(err) => {
                    evidence.push(QueryEvidence::failed(query.clone(), qtype, err.to_string()));
                }
            }
        }
        evidence
    }

    /// Decide whether to stop iterating: never before
    /// `min_iterations_before_early_stop`, never on the last allowed
    /// iteration (there is nothing left to gain by stopping "early"), then
    /// stop once the best score fails to improve by at least
    /// `min_score_improvement`.
    fn should_stop_early(&self, iteration: usize, improvement: f64) -> bool {
        iteration >= self.config.min_iterations_before_early_stop
            && iteration < self.config.max_iterations
            && improvement < self.config.min_score_improvement
    }

    fn notify(&self, progress: &Option<ProgressSink>, event: ProgressEvent) {
        if let Some(sink) = progress {
            progress::emit(sink, event);
        }
    }

    /// Run the iterative self-query loop for `question`, returning packed
    /// evidence and a context string ready to inject into an answer prompt.
    #[instrument(skip(self, adapter, progress, question))]
    pub async fn process(
        &self,
        adapter: &dyn LlmAdapter,
        model_id: &str,
        question: &str,
        progress: Option<ProgressSink>,
    ) -> ProcessResult {
        let start = Instant::now();
        let mut all_candidates: Vec<String> = Vec::new();
        let mut all_evidence: Vec<QueryEvidence> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut best_score = 0.0_f64;
        let mut iterations_used = 0;
        let mut stop_reason = STOP_MAX_ITERATIONS.to_string();

        self.notify(
            &progress,
            ProgressEvent::new(
                ProgressStage::Start,
                "starting retrieval",
                serde_json::json!({
                    "max_iterations": self.config.max_iterations,
                    "min_iterations_before_early_stop": self.config.min_iterations_before_early_stop,
                }),
            ),
        );

        let schema = self.load_schema_context().await;
        self.notify(
            &progress,
            ProgressEvent::new(
                ProgressStage::SchemaMetadata,
                "schema metadata ready",
                serde_json::json!({ "chars": schema.metadata_json_text.chars().count() }),
            ),
        );
        if self.config.include_full_schema_ttl {
            self.notify(
                &progress,
                ProgressEvent::new(
                    ProgressStage::SchemaTtl,
                    "schema ttl ready",
                    serde_json::json!({ "chars": schema.ttl_text.chars().count() }),
                ),
            );
        }

        for iteration in 1..=self.config.max_iterations {
            if self.global_budget_reached(start) {
                stop_reason = STOP_GLOBAL_TIME_BUDGET.to_string();
                self.notify(
                    &progress,
                    ProgressEvent::new(
                        ProgressStage::IterationStop,
                        "global time budget exceeded",
                        serde_json::json!({
                            "iteration": iteration,
                            "elapsed_sec": start.elapsed().as_secs_f64(),
                            "budget_sec": self.config.global_time_budget_sec,
                        }),
                    ),
                );
                break;
            }

            self.notify(
                &progress,
                ProgressEvent::new(
                    ProgressStage::IterationStart,
                    format!("starting iteration {iteration}"),
                    serde_json::json!({ "iteration": iteration, "max_iterations": self.config.max_iterations }),
                ),
            );

            let (_, loop_context) = packer::pack(&all_evidence, self.config.top_k);

            let (planner_count, lexical_count, candidates) = self
                .plan_iteration_candidates(adapter, model_id, question, schema, iteration, &loop_context, &seen)
                .await;
            for candidate in &candidates {
                seen.insert(normalize_query(candidate));
            }

            let query_previews: Vec<String> = candidates.iter().take(2).map(|q| compact_preview(q)).collect();
            self.notify(
                &progress,
                ProgressEvent::new(
                    ProgressStage::IterationCandidates,
                    format!("{} new candidates this iteration", candidates.len()),
                    serde_json::json!({
                        "iteration": iteration,
                        "planner_candidates": planner_count,
                        "lexical_candidates": lexical_count,
                        "new_candidates": candidates.len(),
                        "query_previews": query_previews,
                    }),
                ),
            );

            if candidates.is_empty() {
                stop_reason = STOP_NO_NEW_CANDIDATES.to_string();
                iterations_used = iteration;
                info!(iteration, "planner and lexical generator produced no new candidates, stopping");
                self.notify(
                    &progress,
                    ProgressEvent::new(
                        ProgressStage::IterationStop,
                        "no new candidates produced",
                        serde_json::json!({ "iteration": iteration }),
                    ),
                );
                break;
            }

            all_candidates.extend(candidates.iter().cloned());
            let iteration_evidence = self.execute_iteration_candidates(&candidates, question).await;
            all_evidence.extend(iteration_evidence);
            iterations_used = iteration;

            self.notify(
                &progress,
                ProgressEvent::new(
                    ProgressStage::IterationExecuted,
                    format!("executed {} queries", candidates.len()),
                    serde_json::json!({
                        "iteration": iteration,
                        "executed_queries": candidates.len(),
                        "evidence_count": all_evidence.len(),
                    }),
                ),
            );

            let next_best = all_evidence.iter().map(|e| e.score).fold(0.0_f64, f64::max);
            let improvement = next_best - best_score;
            best_score = next_best;

            if self.should_stop_early(iteration, improvement) {
                stop_reason = STOP_NO_MEANINGFUL_IMPROVEMENT.to_string();
                self.notify(
                    &progress,
                    ProgressEvent::new(
                        ProgressStage::IterationStop,
                        "stopping early: insufficient score improvement",
                        serde_json::json!({
                            "iteration": iteration,
                            "improvement": improvement,
                            "minimum_improvement": self.config.min_score_improvement,
                        }),
                    ),
                );
                break;
            }
        }

        let (ranked, context) = packer::pack(&all_evidence, self.config.top_k);

        self.notify(
            &progress,
            ProgressEvent::new(
                ProgressStage::Complete,
                "retrieval complete",
                serde_json::json!({
                    "iterations_used": iterations_used,
                    "stop_reason": stop_reason,
                    "selected_evidence": ranked.len(),
                }),
            )
            .done(),
        );

        ProcessResult {
            schema_metadata: schema.metadata_json_text.clone(),
            queries: all_candidates,
            evidence: ranked,
            context,
            iterations_used,
            stop_reason,
        }
    }
}

fn score_payload(payload: &SparqlPayload, question: &str, cfg: &EngineConfig) -> (String, f64) {
    match payload {
        SparqlPayload::Json(value) => {
            if let Some(describe_score) = value.get("_describe_score").and_then(|v| v.as_f64()) {
                let preview = value
                    .get("results")
                    .and_then(|r| r.get("bindings"))
                    .and_then(|b| b.as_array())
                    .and_then(|b| b.first())
                    .and_then(|b| b.get("describe"))
                    .and_then(|d| d.get("value"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let (_, bindings_score) = scorer::score_json(value, question, cfg.max_rows);
                (preview, bindings_score.max(describe_score))
            } else {
                scorer::score_json(value, question, cfg.max_rows)
            }
        }
        SparqlPayload::Turtle(turtle) => scorer::score_construct(turtle, question, cfg.max_triples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockAdapter;

    #[test]
    fn build_rejects_empty_endpoint() {
        let result = SelfQueryEngine::build(String::new(), EngineConfig::default());
        assert!(matches!(result, Err(EngineBuildError::MissingField("endpoint"))));
    }

    #[test]
    fn build_accepts_a_real_endpoint() {
        let result = SelfQueryEngine::build("http://localhost:7200/query".to_string(), EngineConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn normalize_query_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_query("SELECT  ?s\nWHERE { ?s ?p ?o }"),
            "select ?s where { ?s ?p ?o }"
        );
    }

    #[test]
    fn construct_turtle_payload_scores_directly_with_no_describe_merge() {
        let cfg = EngineConfig::default().normalize();
        let turtle = "<a> <b> <c> .\n<d> <e> <f> .\n";
        let payload = SparqlPayload::Turtle(turtle.to_string());
        let (preview, score) = score_payload(&payload, "nothing relevant", &cfg);
        let expected = scorer::score_construct(turtle, "nothing relevant", cfg.max_triples);
        assert_eq!((preview, score), expected);
    }

    #[test]
    fn describe_json_payload_takes_max_of_bindings_and_describe_score() {
        let cfg = EngineConfig::default().normalize();
        let payload = SparqlPayload::Json(serde_json::json!({
            "results": { "bindings": [{ "describe": { "type": "literal", "value": "<a> <b> <c> ." } }] },
            "_describe_score": 0.9,
        }));
        let (_, score) = score_payload(&payload, "anything", &cfg);
        assert_eq!(score, 0.9);
    }

    #[tokio::test]
    async fn process_never_panics_on_an_adapter_with_no_scripted_responses() {
        let engine = SelfQueryEngine::build(
            "http://localhost:1/query".to_string(),
            EngineConfig {
                max_iterations: 1,
                enable_lexical_search: false,
                ..EngineConfig::default()
            },
        )
        .unwrap();
        let adapter = MockAdapter::empty();
        let result = engine.process(&adapter, "mock-model", "who discovered radium", None).await;
        assert_eq!(result.iterations_used, 1);
        assert_eq!(result.stop_reason, STOP_MAX_ITERATIONS);
    }
}
