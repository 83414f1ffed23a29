//! Planner Invoker (spec §4.E). Prompts the LLM for a short list of
//! candidate SPARQL queries given the question, schema context and prior
//! evidence, with the original's fallback behavior on timeout or malformed
//! output. Grounded on
//! `original_source/.../selfquery_llm.py::build_query_prompt` /
//! `generate_sparql_candidates` / `_extract_queries` / `_fallback_query`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::llm::{ChatMessage, LlmAdapter};
use crate::schema::SchemaContext;

/// Strict JSON shape the planner is asked for. `schemars` generates the
/// schema text embedded in the prompt, mirroring
/// `QueryResolver::augment_prompt_with_schema`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlannerResponse {
    pub queries: Vec<String>,
}

/// Matches the start of a SPARQL fragment beginning a line, used when
/// strict JSON parsing fails. The `regex` crate has no lookahead, so instead
/// of the original's
/// `(?:SELECT|ASK|CONSTRUCT)\s+.*?(?=(?:\n\s*(?:SELECT|ASK|CONSTRUCT)\s)|\Z)`
/// lookahead, [`extract_queries`] finds every such start and slices the text
/// between consecutive starts (or end of text) — the same "up to next
/// keyword or end of text" result. Scoped to `SELECT|ASK|CONSTRUCT` only,
/// per spec §4.E step 2 (`DESCRIBE` is not part of this fallback shape).
static QUERY_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*(?:SELECT|ASK|CONSTRUCT)\b").unwrap());

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

fn strip_fences(text: &str) -> &str {
    FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// Extract SPARQL fragments beginning with `SELECT`/`ASK`/`CONSTRUCT`, each
/// running up to the next such keyword or the end of the text (spec §4.E
/// step 2). A response like `"SELECT ... LIMIT 10\nASK WHERE {...}"` with no
/// blank line between the two queries still splits into two fragments.
fn extract_queries(text: &str) -> Vec<String> {
    let starts: Vec<usize> = QUERY_START_RE.find_iter(text).map(|m| m.start()).collect();
    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            let query = text[start..end].trim();
            if query.is_empty() {
                None
            } else {
                Some(query.to_string())
            }
        })
        .collect()
}

/// Build the planner prompt, including the iteration-stage guidance and the
/// JSON schema annotation for the expected response shape.
pub fn build_prompt(
    question: &str,
    schema: &SchemaContext,
    cfg: &EngineConfig,
    iteration: usize,
    prior_evidence_preview: &str,
) -> String {
    let schema_json = serde_json::to_string_pretty(&schemars::schema_for!(PlannerResponse))
        .unwrap_or_default();

    // Spec §4.E: these two notes are independent additions, not alternatives
    // — an early iteration that already has prior evidence gets both.
    let mut stage_notes = Vec::new();
    if iteration < cfg.min_iterations_before_early_stop {
        stage_notes.push(
            "This is an early iteration; propose exploratory queries even if you are unsure they will help.",
        );
    }
    if !prior_evidence_preview.is_empty() {
        stage_notes.push("If the evidence gathered so far is already strong, return an empty `queries` list.");
    }
    let stage_note = stage_notes.join(" ");

    format!(
        "You are generating SPARQL queries to help answer a user's question over a knowledge graph.\n\
         Question: {question}\n\n\
         Schema metadata:\n{metadata}\n\n\
         Schema (Turtle excerpt):\n{ttl}\n\n\
         Prior evidence gathered so far:\n{prior}\n\n\
         Propose up to {n} SPARQL queries (SELECT, ASK, CONSTRUCT{describe_note}) that would help \
         answer the question. {stage_note}\n\n\
         Respond with a single JSON object matching this schema:\n{schema_json}",
        question = question,
        metadata = schema.metadata_json_text,
        ttl = schema.ttl_text,
        prior = prior_evidence_preview,
        n = cfg.query_candidates_per_iter,
        describe_note = if cfg.allow_describe { ", or DESCRIBE" } else { "" },
        stage_note = stage_note,
        schema_json = schema_json,
    )
}

/// A crude substring-match fallback query, used when the planner cannot be
/// consulted at all (timeout/error) on the first iteration. Mirrors
/// `_fallback_query`.
pub fn fallback_query(question: &str, max_rows: usize) -> String {
    let escaped = question.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "SELECT ?s ?p ?o WHERE {{ ?s ?p ?o . FILTER(CONTAINS(LCASE(STR(?s)), LCASE('{escaped}')) || \
         CONTAINS(LCASE(STR(?o)), LCASE('{escaped}'))) }} LIMIT {max_rows}"
    )
}

fn parse_queries(raw: &str) -> Vec<String> {
    let stripped = strip_fences(raw);
    if let Ok(parsed) = serde_json::from_str::<PlannerResponse>(stripped) {
        return parsed.queries;
    }
    extract_queries(raw)
}

/// Ask the LLM for this iteration's candidate queries. Never fails: on
/// timeout, any `chat_json` error, or a response that parses to zero
/// queries, the first iteration falls back to one substring-match query;
/// later iterations return an empty list. Per spec §7's `PlannerTimeout` /
/// `PlannerFailed` recovery rule and the "fallback activation" round-trip
/// property in §8.
pub async fn invoke(
    adapter: &dyn LlmAdapter,
    model_id: &str,
    question: &str,
    schema: &SchemaContext,
    cfg: &EngineConfig,
    iteration: usize,
    prior_evidence_preview: &str,
) -> Vec<String> {
    let prompt = build_prompt(question, schema, cfg, iteration, prior_evidence_preview);
    let messages = vec![ChatMessage::user(prompt)];

    let call = adapter.chat_json(model_id, &messages, 0.0, cfg.planner_max_tokens);
    let result = tokio::time::timeout(Duration::from_secs(cfg.planner_timeout_sec), call).await;

    let queries = match result {
        Ok(Ok(raw)) => {
            let mut queries = parse_queries(&raw);
            queries.truncate(cfg.query_candidates_per_iter);
            queries
        }
        Ok(Err(_)) | Err(_) => Vec::new(),
    };

    if queries.is_empty() && iteration == 1 {
        vec![fallback_query(question, cfg.max_rows)]
    } else {
        queries
    }
}
