//! Result Packer (spec §4.I) and the `QueryEvidence` record spec §3 defines.
//! Grounded on `original_source/.../selfquery_llm.py::rank_and_pack_context`.

use crate::sparql::QueryType;

/// One query's outcome: either a scored preview or a failure reason. The
/// `failed` constructor is the only way to build a failure record, so score
/// 0.0 / empty preview is enforced by construction rather than by
/// convention.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryEvidence {
    pub query: String,
    pub query_type: QueryType,
    pub preview: String,
    pub score: f64,
    pub error: Option<String>,
}

impl QueryEvidence {
    #[must_use]
    pub fn success(query: String, query_type: QueryType, preview: String, score: f64) -> Self {
        Self {
            query,
            query_type,
            preview,
            score,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(query: String, query_type: QueryType, reason: impl Into<String>) -> Self {
        Self {
            query,
            query_type,
            preview: String::new(),
            score: 0.0,
            error: Some(reason.into()),
        }
    }
}

/// Sort evidence by score descending (stable sort — ties keep their
/// original relative order, see DESIGN.md), keep the top `top_k`, and render
/// them into one text block for prompt injection, per spec §4.I's
/// `Evidence #N` / `QueryType:` / `Query:` / `Error:` (or `Top
/// bindings/subgraph:`) field layout.
#[must_use]
pub fn pack(evidence: &[QueryEvidence], top_k: usize) -> (Vec<QueryEvidence>, String) {
    let mut ranked: Vec<QueryEvidence> = evidence.to_vec();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);

    let text = ranked
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let result_line = match &e.error {
                Some(reason) => format!("Error: {reason}"),
                None => format!("Top bindings/subgraph: {}", e.preview),
            };
            format!(
                "Evidence #{rank}\nQueryType: {qtype}\nQuery: {query}\n{result_line}",
                rank = i + 1,
                qtype = e.query_type.as_str(),
                query = e.query,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    (ranked, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_sorts_by_score_descending() {
        let evidence = vec![
            QueryEvidence::success("Q1".into(), QueryType::Select, "p1".into(), 0.2),
            QueryEvidence::success("Q2".into(), QueryType::Select, "p2".into(), 0.9),
            QueryEvidence::success("Q3".into(), QueryType::Ask, "p3".into(), 0.5),
        ];
        let (ranked, _) = pack(&evidence, 3);
        assert_eq!(ranked[0].query, "Q2");
        assert_eq!(ranked[1].query, "Q3");
        assert_eq!(ranked[2].query, "Q1");
    }

    #[test]
    fn pack_truncates_to_top_k() {
        let evidence = vec![
            QueryEvidence::success("Q1".into(), QueryType::Select, "p1".into(), 0.9),
            QueryEvidence::success("Q2".into(), QueryType::Select, "p2".into(), 0.8),
            QueryEvidence::success("Q3".into(), QueryType::Select, "p3".into(), 0.7),
        ];
        let (ranked, _) = pack(&evidence, 2);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn ties_preserve_insertion_order() {
        let evidence = vec![
            QueryEvidence::success("Q1".into(), QueryType::Select, "p1".into(), 0.5),
            QueryEvidence::success("Q2".into(), QueryType::Select, "p2".into(), 0.5),
        ];
        let (ranked, _) = pack(&evidence, 2);
        assert_eq!(ranked[0].query, "Q1");
        assert_eq!(ranked[1].query, "Q2");
    }

    #[test]
    fn failed_evidence_always_scores_zero_with_empty_preview() {
        let e = QueryEvidence::failed("bad".into(), QueryType::Select, "rejected");
        assert_eq!(e.score, 0.0);
        assert_eq!(e.preview, "");
        assert_eq!(e.error.as_deref(), Some("rejected"));
    }

    #[test]
    fn pack_text_includes_rank_type_and_score() {
        let evidence = vec![QueryEvidence::success(
            "SELECT ?s WHERE { ?s ?p ?o } LIMIT 1".into(),
            QueryType::Select,
            "row".into(),
            0.75,
        )];
        let (_, text) = pack(&evidence, 1);
        assert!(text.contains("Evidence #1"));
        assert!(text.contains("QueryType: SELECT"));
        assert!(text.contains("Top bindings/subgraph: row"));
    }

    #[test]
    fn pack_text_renders_error_field_for_failed_evidence() {
        let evidence = vec![QueryEvidence::failed(
            "SELECT ?s WHERE { ?s ?p ?o }".into(),
            QueryType::Unknown,
            "Row/graph returning query must include LIMIT",
        )];
        let (_, text) = pack(&evidence, 1);
        assert!(text.contains("Error: Row/graph returning query must include LIMIT"));
        assert!(!text.contains("Top bindings/subgraph"));
    }
}
