//! Scorer (spec §4.F). Produces a preview string and a `[0, 1]` score for a
//! query's result payload. Grounded bit-for-bit on
//! `original_source/.../selfquery_llm.py::_score_json_payload` /
//! `_score_construct_payload` / `_tokenize_user_query`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Matches the original's `TEXT_TOKEN_RE` used for lexical-hit counting
/// against row/triple text.
static TEXT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z0-9_]+").unwrap());

/// Matches the original's `USER_QUERY_TOKEN_RE` used when tokenizing the
/// user's question for lexical-hit comparison.
static USER_QUERY_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9_\-]{2,}").unwrap());

const LEXICAL_HIT_WEIGHT: f64 = 0.03;

/// Tokenize the user's question into lowercased terms for lexical-hit
/// comparisons. Mirrors `_tokenize_user_query`.
pub fn tokenize_user_query(question: &str) -> HashSet<String> {
    USER_QUERY_TOKEN_RE
        .find_iter(question)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn tokenize_text(text: &str) -> HashSet<String> {
    TEXT_TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn count_lexical_hits(text: &str, question_tokens: &HashSet<String>) -> usize {
    if question_tokens.is_empty() {
        return 0;
    }
    tokenize_text(text)
        .intersection(question_tokens)
        .count()
}

/// Serialize one SPARQL-JSON binding row as a compact `{var: value}` JSON
/// line, per spec §4.F ("serialize `{var: value}` pairs as compact JSON
/// lines").
fn flatten_binding(binding: &serde_json::Map<String, serde_json::Value>) -> String {
    let compact: serde_json::Map<String, serde_json::Value> = binding
        .iter()
        .filter_map(|(var, v)| {
            let value = v.get("value").and_then(|v| v.as_str())?;
            Some((var.clone(), serde_json::Value::String(value.to_string())))
        })
        .collect();
    serde_json::Value::Object(compact).to_string()
}

/// Score a SELECT/ASK/CONSTRUCT-as-JSON payload. Returns `(preview, score)`.
/// `max_rows` caps both the preview length and the row-fraction denominator.
pub fn score_json(payload: &serde_json::Value, question: &str, max_rows: usize) -> (String, f64) {
    let question_tokens = tokenize_user_query(question);

    if let Some(boolean) = payload.get("boolean").and_then(|b| b.as_bool()) {
        let preview = format!("ASK result: {}", if boolean { "True" } else { "False" });
        let score = if boolean { 1.0 } else { 0.2 };
        return (preview, score);
    }

    let bindings = payload
        .get("results")
        .and_then(|r| r.get("bindings"))
        .and_then(|b| b.as_array())
        .cloned()
        .unwrap_or_default();

    if bindings.is_empty() {
        return (String::new(), 0.0);
    }

    let max_rows = max_rows.max(1);
    let previews: Vec<String> = bindings
        .iter()
        .take(max_rows)
        .filter_map(|b| b.as_object())
        .map(flatten_binding)
        .collect();
    let preview = previews.join("\n");

    let lexical_hits: usize = previews
        .iter()
        .map(|row| count_lexical_hits(row, &question_tokens))
        .sum();
    let row_fraction = bindings.len() as f64 / max_rows as f64;
    let score = (row_fraction + LEXICAL_HIT_WEIGHT * lexical_hits as f64).min(1.0);

    (preview, score)
}

/// Score a CONSTRUCT/DESCRIBE Turtle payload. Returns `(preview, score)`.
/// `max_triples` caps both the preview triple count and the
/// triple-fraction denominator; blank lines and `@prefix` declarations are
/// dropped before counting, per spec §4.F.
pub fn score_construct(turtle: &str, question: &str, max_triples: usize) -> (String, f64) {
    let question_tokens = tokenize_user_query(question);

    let lines: Vec<&str> = turtle
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("@prefix"))
        .collect();

    if lines.is_empty() {
        return (String::new(), 0.0);
    }

    let max_triples = max_triples.max(1);
    let kept: Vec<&str> = lines.iter().take(max_triples).cloned().collect();
    let preview = kept.join("\n");

    let lexical_hits: usize = kept
        .iter()
        .map(|line| count_lexical_hits(line, &question_tokens))
        .sum();
    let triple_fraction = lines.len() as f64 / max_triples as f64;
    let score = (triple_fraction + LEXICAL_HIT_WEIGHT * lexical_hits as f64).min(1.0);

    (preview, score)
}
