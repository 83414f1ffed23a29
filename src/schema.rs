//! Schema Context Loader (spec §4.C). Loads a short metadata summary (class
//! counts, property list) and, optionally, a schema-only Turtle excerpt, once
//! per engine and memoized behind a `tokio::sync::OnceCell`. Grounded on
//! `original_source/.../selfquery_llm.py::get_schema_metadata` /
//! `get_schema_ttl`.

use crate::config::EngineConfig;
use crate::sparql::endpoint::EndpointDriver;
use tracing::{instrument, warn};

/// The cached schema summary an engine builds once and reuses across
/// iterations and calls to `process`.
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    pub metadata_json_text: String,
    pub ttl_text: String,
}

fn graph_wrap(body: &str, graph_uri: &str) -> String {
    if graph_uri.is_empty() {
        body.to_string()
    } else {
        format!("GRAPH <{graph_uri}> {{ {body} }}")
    }
}

fn classes_query(graph_uri: &str) -> String {
    let body = graph_wrap(
        "?class a owl:Class . OPTIONAL { ?instance a ?class }",
        graph_uri,
    );
    format!(
        "PREFIX owl: <http://www.w3.org/2002/07/owl#> \
         SELECT ?class (COUNT(?instance) AS ?instanceCount) WHERE {{ {body} }} \
         GROUP BY ?class ORDER BY DESC(?instanceCount) LIMIT 25"
    )
}

fn properties_query(graph_uri: &str) -> String {
    let body = graph_wrap(
        "?property a rdf:Property . OPTIONAL { ?property rdfs:domain ?domain } \
         OPTIONAL { ?property rdfs:range ?range }",
        graph_uri,
    );
    format!(
        "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
         PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
         SELECT ?property ?domain ?range WHERE {{ {body} }} LIMIT 30"
    )
}

fn schema_construct_query(graph_uri: &str) -> String {
    let body = graph_wrap(
        "?s a ?class . OPTIONAL { ?s rdfs:label ?label } OPTIONAL { ?s rdfs:comment ?comment }",
        graph_uri,
    );
    format!(
        "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
         CONSTRUCT {{ ?s a ?class ; rdfs:label ?label ; rdfs:comment ?comment }} \
         WHERE {{ {body} }} LIMIT 200"
    )
}

/// Loads and caches schema context for one configured endpoint.
#[derive(Debug, Default)]
pub struct SchemaLoader;

impl SchemaLoader {
    /// Fetch both the metadata summary and (if enabled) the schema Turtle
    /// excerpt. Never fails: any underlying SPARQL error is absorbed into a
    /// `warning` field (metadata) or an empty string (ttl), per spec §7's
    /// `SchemaFetchFailed` recovery rule.
    #[instrument(skip(driver, cfg))]
    pub async fn load(driver: &EndpointDriver, cfg: &EngineConfig) -> SchemaContext {
        let metadata_json_text = Self::load_metadata(driver, &cfg.schema_graph_uri).await;
        let ttl_text = if cfg.include_full_schema_ttl {
            Self::load_ttl(driver, cfg).await
        } else {
            String::new()
        };
        SchemaContext {
            metadata_json_text,
            ttl_text,
        }
    }

    async fn load_metadata(driver: &EndpointDriver, graph_uri: &str) -> String {
        let classes = match driver.execute_json(&classes_query(graph_uri), "").await {
            Ok(payload) => extract_classes(&payload),
            Err(err) => {
                warn!(error = %err, "schema class metadata query failed");
                return synthesize_warning(&err.to_string());
            }
        };
        let properties = match driver.execute_json(&properties_query(graph_uri), "").await {
            Ok(payload) => extract_properties(&payload),
            Err(err) => {
                warn!(error = %err, "schema property metadata query failed");
                return synthesize_warning(&err.to_string());
            }
        };
        serde_json::json!({ "classes": classes, "properties": properties }).to_string()
    }

    async fn load_ttl(driver: &EndpointDriver, cfg: &EngineConfig) -> String {
        let query = schema_construct_query(&cfg.schema_graph_uri);
        let ttl = match driver.execute_turtle(&query).await {
            Ok(ttl) => ttl,
            Err(err) => {
                warn!(error = %err, "schema ttl query failed");
                return String::new();
            }
        };
        if cfg.schema_ttl_max_chars >= 0 {
            let max = cfg.schema_ttl_max_chars as usize;
            if ttl.len() > max {
                return ttl.chars().take(max).collect();
            }
        }
        ttl
    }
}

fn bindings(payload: &serde_json::Value) -> &[serde_json::Value] {
    payload
        .get("results")
        .and_then(|r| r.get("bindings"))
        .and_then(|b| b.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn bound_str(row: &serde_json::Value, key: &str) -> Option<String> {
    row.get(key)?.get("value")?.as_str().map(str::to_string)
}

/// Extract `{class, instanceCount}` objects, per spec §3/§4.C. A class with
/// no instances still appears, with `instanceCount: 0`, since the instance
/// binding is `OPTIONAL`.
fn extract_classes(payload: &serde_json::Value) -> Vec<serde_json::Value> {
    bindings(payload)
        .iter()
        .filter_map(|row| {
            let class = bound_str(row, "class")?;
            let instance_count = bound_str(row, "instanceCount")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            Some(serde_json::json!({ "class": class, "instanceCount": instance_count }))
        })
        .collect()
}

/// Extract `{property, domain, range}` objects, per spec §3/§4.C.
/// `domain`/`range` are `null` when the optional binding is absent.
fn extract_properties(payload: &serde_json::Value) -> Vec<serde_json::Value> {
    bindings(payload)
        .iter()
        .filter_map(|row| {
            let property = bound_str(row, "property")?;
            let domain = bound_str(row, "domain");
            let range = bound_str(row, "range");
            Some(serde_json::json!({ "property": property, "domain": domain, "range": range }))
        })
        .collect()
}

fn synthesize_warning(reason: &str) -> String {
    serde_json::json!({ "classes": [], "properties": [], "warning": reason }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_query_applies_graph_wrapper_when_set() {
        let q = classes_query("http://example.com/g");
        assert!(q.contains("GRAPH <http://example.com/g>"));
        assert!(q.contains("LIMIT 25"));
    }

    #[test]
    fn classes_query_has_no_graph_wrapper_when_unset() {
        let q = classes_query("");
        assert!(!q.contains("GRAPH"));
    }

    #[test]
    fn synthesize_warning_has_empty_classes_and_properties() {
        let warning = synthesize_warning("boom");
        let parsed: serde_json::Value = serde_json::from_str(&warning).unwrap();
        assert_eq!(parsed["classes"], serde_json::json!([]));
        assert_eq!(parsed["properties"], serde_json::json!([]));
        assert_eq!(parsed["warning"], "boom");
    }

    #[test]
    fn extract_classes_pulls_class_and_instance_count() {
        let payload = serde_json::json!({
            "results": { "bindings": [
                { "class": { "type": "uri", "value": "http://ex/Person" },
                  "instanceCount": { "type": "literal", "value": "12" } },
                { "class": { "type": "uri", "value": "http://ex/Org" },
                  "instanceCount": { "type": "literal", "value": "0" } },
            ]}
        });
        let rows = extract_classes(&payload);
        assert_eq!(
            rows,
            vec![
                serde_json::json!({ "class": "http://ex/Person", "instanceCount": 12 }),
                serde_json::json!({ "class": "http://ex/Org", "instanceCount": 0 }),
            ]
        );
    }

    #[test]
    fn extract_properties_carries_optional_domain_and_range() {
        let payload = serde_json::json!({
            "results": { "bindings": [
                { "property": { "type": "uri", "value": "http://ex/name" },
                  "domain": { "type": "uri", "value": "http://ex/Person" } },
                { "property": { "type": "uri", "value": "http://ex/untyped" } },
            ]}
        });
        let rows = extract_properties(&payload);
        assert_eq!(
            rows,
            vec![
                serde_json::json!({ "property": "http://ex/name", "domain": "http://ex/Person", "range": null }),
                serde_json::json!({ "property": "http://ex/untyped", "domain": null, "range": null }),
            ]
        );
    }

    #[test]
    fn properties_query_declares_rdf_and_rdfs_prefixes() {
        let q = properties_query("");
        assert!(q.contains("PREFIX rdf:"));
        assert!(q.contains("PREFIX rdfs:"));
        assert!(q.contains("?domain"));
        assert!(q.contains("?range"));
    }

    #[test]
    fn classes_query_counts_instances_optionally() {
        let q = classes_query("");
        assert!(q.contains("owl:Class"));
        assert!(q.contains("OPTIONAL { ?instance a ?class }"));
    }
}
