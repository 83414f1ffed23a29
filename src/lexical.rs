//! Lexical Candidate Generator (spec §4.D). Turns the user's question into a
//! small, schema-agnostic set of probe queries built from literal tokens,
//! used alongside the planner's LLM-generated candidates. Grounded on
//! `original_source/.../selfquery_llm.py::_build_lexical_candidates` /
//! `USER_QUERY_TOKEN_RE`.

use crate::config::EngineConfig;
use std::sync::LazyLock;

use regex::Regex;

/// `USER_QUERY_TOKEN_RE` from the original — distinct from the scorer's
/// token regex (see DESIGN.md's Open Question decisions).
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_\-]{2,}").unwrap());

/// Tokenize `question`, lowercased, de-duplicated in first-seen order,
/// capped at `cfg.lexical_max_tokens`.
fn tokenize(question: &str, cfg: &EngineConfig) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tokens = Vec::new();
    for m in TOKEN_RE.find_iter(question) {
        let token = m.as_str().to_lowercase();
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
        if tokens.len() >= cfg.lexical_max_tokens {
            break;
        }
    }
    tokens
}

/// Escape a token for safe embedding in a single-quoted SPARQL string
/// literal, per spec §4.D ("escape `\` and `'`").
fn escape_token(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build the OR'd filter expression over every enabled flag and every
/// token, per spec §4.D. Returns `None` if no flag is enabled or no tokens
/// were produced — in that case the generator emits no candidates at all.
fn build_filter_disjuncts(tokens: &[String], cfg: &EngineConfig) -> Option<String> {
    let mut disjuncts = Vec::new();
    for token in tokens {
        let t = escape_token(token);
        if cfg.lexical_match_literals {
            disjuncts.push(format!("CONTAINS(LCASE(STR(?o)), LCASE('{t}'))"));
        }
        if cfg.lexical_match_labels {
            disjuncts.push(format!("CONTAINS(LCASE(STR(?label)), LCASE('{t}'))"));
        }
        if cfg.lexical_match_iri_local_names {
            disjuncts.push(format!(
                "CONTAINS(LCASE(REPLACE(STR(?s), '^.*[#/]', '')), LCASE('{t}'))"
            ));
            disjuncts.push(format!(
                "CONTAINS(LCASE(REPLACE(STR(?o), '^.*[#/]', '')), LCASE('{t}'))"
            ));
        }
        if cfg.lexical_match_predicates {
            disjuncts.push(format!(
                "CONTAINS(LCASE(REPLACE(STR(?p), '^.*[#/]', '')), LCASE('{t}'))"
            ));
        }
    }
    if disjuncts.is_empty() {
        None
    } else {
        Some(disjuncts.join(" || "))
    }
}

const RDFS_LABEL: &str = "<http://www.w3.org/2000/01/rdf-schema#label>";
const SKOS_PREF_LABEL: &str = "<http://www.w3.org/2004/02/skos/core#prefLabel>";

fn binding_filter_query(filter: &str, max_rows: usize) -> String {
    format!(
        "SELECT ?s ?p ?o ?label WHERE {{ \
         ?s ?p ?o . \
         OPTIONAL {{ ?s {RDFS_LABEL} ?label }} \
         OPTIONAL {{ ?s {SKOS_PREF_LABEL} ?label }} \
         FILTER({filter}) \
         }} LIMIT {max_rows}"
    )
}

fn type_label_query(filter: &str, max_rows: usize) -> String {
    format!(
        "SELECT ?s ?label WHERE {{ \
         ?s a ?type . \
         OPTIONAL {{ ?s {RDFS_LABEL} ?label }} \
         OPTIONAL {{ ?s {SKOS_PREF_LABEL} ?label }} \
         FILTER({filter}) \
         }} LIMIT {max_rows}"
    )
}

/// Build the lexical candidate query set for `question`, honoring
/// `cfg.enable_lexical_search` and the `lexical_match_*` toggles. Emits up
/// to `cfg.lexical_max_candidates` of the fixed two-query template set
/// (spec §4.D), binding-filter variant first, type/label variant second.
pub fn build_candidates(question: &str, cfg: &EngineConfig) -> Vec<String> {
    if !cfg.enable_lexical_search {
        return Vec::new();
    }

    let tokens = tokenize(question, cfg);
    let Some(filter) = build_filter_disjuncts(&tokens, cfg) else {
        return Vec::new();
    };

    let mut candidates = vec![
        binding_filter_query(&filter, cfg.max_rows),
        type_label_query(&filter, cfg.max_rows),
    ];
    candidates.truncate(cfg.lexical_max_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EngineConfig {
        EngineConfig::default().normalize()
    }

    #[test]
    fn disabled_lexical_search_returns_no_candidates() {
        let mut c = cfg();
        c.enable_lexical_search = false;
        assert!(build_candidates("who discovered radium", &c).is_empty());
    }

    #[test]
    fn empty_question_yields_no_tokens_and_no_candidates() {
        assert!(build_candidates("   ", &cfg()).is_empty());
    }

    #[test]
    fn all_flags_disabled_yields_no_candidates_even_with_tokens() {
        let mut c = cfg();
        c.lexical_match_literals = false;
        c.lexical_match_labels = false;
        c.lexical_match_iri_local_names = false;
        c.lexical_match_predicates = false;
        assert!(build_candidates("marie curie", &c).is_empty());
    }

    #[test]
    fn tokenizing_caps_at_lexical_max_tokens() {
        let mut c = cfg();
        c.lexical_max_tokens = 2;
        let tokens = tokenize("alpha beta gamma delta", &c);
        assert_eq!(tokens, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn candidates_are_truncated_to_max_candidates() {
        let mut c = cfg();
        c.lexical_max_candidates = 1;
        let candidates = build_candidates("marie curie", &c);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn binding_filter_query_comes_before_type_label_variant() {
        let candidates = build_candidates("marie curie", &cfg());
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].contains("?s ?p ?o ?label"));
        assert!(candidates[1].starts_with("SELECT ?s ?label WHERE { ?s a ?type"));
    }

    #[test]
    fn filter_uses_contains_lcase_for_each_token() {
        let candidates = build_candidates("marie curie", &cfg());
        assert!(candidates[0].contains("CONTAINS(LCASE(STR(?o)), LCASE('marie'))"));
        assert!(candidates[0].contains("CONTAINS(LCASE(STR(?o)), LCASE('curie'))"));
        assert!(candidates[0].contains(" || "));
    }

    #[test]
    fn query_uses_configured_max_rows_as_limit() {
        let mut c = cfg();
        c.max_rows = 42;
        let candidates = build_candidates("marie curie", &c);
        assert!(candidates[0].ends_with("LIMIT 42"));
    }

    #[test]
    fn tokens_are_case_folded_and_deduplicated() {
        let tokens = tokenize("Marie marie MARIE curie", &cfg());
        assert_eq!(tokens, vec!["marie".to_string(), "curie".to_string()]);
    }

    #[test]
    fn tokens_are_escaped_for_backslash_and_quote() {
        assert_eq!(escape_token("o'brien"), "o\\'brien");
        assert_eq!(escape_token("a\\b"), "a\\\\b");
    }
}
