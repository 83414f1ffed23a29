//! Query Validator (spec §4.B). Read-only whitelist, size cap, mandatory
//! `LIMIT`. Rejection reasons and regexes are grounded verbatim on
//! `original_source/.../selfquery_llm.py`'s `QUERY_TYPE_RE`,
//! `FORBIDDEN_QUERY_RE` and `_validate_query`.

use crate::config::EngineConfig;
use regex::Regex;
use std::sync::LazyLock;

static QUERY_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(SELECT|ASK|CONSTRUCT|DESCRIBE)\b").unwrap());

static FORBIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(INSERT|DELETE|DROP|CLEAR|CREATE|LOAD|COPY|MOVE|ADD|SERVICE|WITH|USING)\b")
        .unwrap()
});

static REMOTE_VALUES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)VALUES\s*\{\s*<http").unwrap());

/// The parsed SPARQL query type (spec §3 `QueryEvidence.query_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QueryType {
    Select,
    Ask,
    Construct,
    Describe,
    Unknown,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Ask => "ASK",
            QueryType::Construct => "CONSTRUCT",
            QueryType::Describe => "DESCRIBE",
            QueryType::Unknown => "UNKNOWN",
        }
    }

    /// Whether this type returns rows/graph content and therefore must carry
    /// a `LIMIT` (spec §4.B rule 4).
    pub fn requires_limit(self) -> bool {
        matches!(self, QueryType::Select | QueryType::Construct)
    }
}

/// Classify a query's leading keyword, independent of whether it is allowed.
pub fn query_type(query: &str) -> QueryType {
    match QUERY_TYPE_RE
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
        .as_deref()
    {
        Some("SELECT") => QueryType::Select,
        Some("ASK") => QueryType::Ask,
        Some("CONSTRUCT") => QueryType::Construct,
        Some("DESCRIBE") => QueryType::Describe,
        _ => QueryType::Unknown,
    }
}

/// Validate `query` against the read-only whitelist in spec §4.B. Returns
/// the query's type on success, or the rejection reason string on failure.
pub fn validate(query: &str, cfg: &EngineConfig) -> Result<QueryType, String> {
    if query.len() > cfg.max_query_chars {
        return Err(format!(
            "Query exceeds max_query_chars ({})",
            cfg.max_query_chars
        ));
    }

    let qtype = query_type(query);
    let mut allowed = vec!["SELECT", "ASK", "CONSTRUCT"];
    if cfg.allow_describe {
        allowed.push("DESCRIBE");
    }
    if !allowed.contains(&qtype.as_str()) {
        return Err(format!("only {} are allowed", allowed.join(", ")));
    }

    if FORBIDDEN_RE.is_match(query) || REMOTE_VALUES_RE.is_match(query) {
        return Err("Query contains forbidden operation".to_string());
    }

    if qtype.requires_limit() && !query.to_lowercase().contains("limit") {
        return Err("Row/graph returning query must include LIMIT".to_string());
    }

    Ok(qtype)
}
