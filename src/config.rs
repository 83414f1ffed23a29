//! Engine configuration (spec §3 `Config`) and environment-sourced provider
//! settings for the demo frontend.
//!
//! Environment binding of `SPARQL_BASE_URL`/`LLM_*` is the pipeline
//! frontend's responsibility, not the engine's — [`ProviderSettings`] exists
//! only so `demos/selfquery-demo` has somewhere to load that binding from,
//! mirroring the teacher's `config::KeyFromEnv` without its interactive
//! prompt-for-key flow.

use std::env;

/// Retrieval engine configuration. All fields are contract, not
/// implementation — see `SPEC_FULL.md` §3.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub top_k: usize,
    pub query_candidates_per_iter: usize,
    pub timeout_sec: u64,
    pub max_rows: usize,
    pub max_triples: usize,
    pub planner_timeout_sec: u64,
    pub planner_max_tokens: i64,
    pub schema_graph_uri: String,
    pub include_full_schema_ttl: bool,
    pub schema_ttl_max_chars: i64,
    pub allow_describe: bool,
    pub enable_lexical_search: bool,
    pub lexical_match_literals: bool,
    pub lexical_match_labels: bool,
    pub lexical_match_iri_local_names: bool,
    pub lexical_match_predicates: bool,
    pub lexical_max_tokens: usize,
    pub lexical_max_candidates: usize,
    pub max_iterations: usize,
    pub min_iterations_before_early_stop: usize,
    pub min_score_improvement: f64,
    pub global_time_budget_sec: u64,
    pub max_query_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            query_candidates_per_iter: 3,
            timeout_sec: 20,
            max_rows: 100,
            max_triples: 30,
            planner_timeout_sec: 45,
            planner_max_tokens: -1,
            schema_graph_uri: String::new(),
            include_full_schema_ttl: true,
            schema_ttl_max_chars: -1,
            allow_describe: true,
            enable_lexical_search: true,
            lexical_match_literals: true,
            lexical_match_labels: true,
            lexical_match_iri_local_names: true,
            lexical_match_predicates: true,
            lexical_max_tokens: 6,
            lexical_max_candidates: 4,
            max_iterations: 5,
            min_iterations_before_early_stop: 3,
            min_score_improvement: 0.02,
            global_time_budget_sec: 90,
            max_query_chars: 8000,
        }
    }
}

impl EngineConfig {
    /// Clamp fields to the bounds spec §3 requires, the way
    /// `SelfQueryLLM.__init__` clamps its valves in the original
    /// implementation. Called once by [`crate::engine::SelfQueryEngine::build`].
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.lexical_max_tokens = self.lexical_max_tokens.max(1);
        self.lexical_max_candidates = self.lexical_max_candidates.max(1);
        self.max_iterations = self.max_iterations.max(1);
        self.min_iterations_before_early_stop = self
            .min_iterations_before_early_stop
            .clamp(1, self.max_iterations);
        self.min_score_improvement = self.min_score_improvement.max(0.0);
        self.global_time_budget_sec = self.global_time_budget_sec.max(1);
        self.max_query_chars = self.max_query_chars.max(256);
        self.top_k = self.top_k.max(1);
        self.query_candidates_per_iter = self.query_candidates_per_iter.max(1);
        self
    }
}

/// Provider connection settings bound from the environment. Used by
/// `demos/selfquery-demo` to stand in for the pipeline frontend; the engine
/// itself never reads the environment.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub llm_provider: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_default_model: String,
    pub sparql_base_url: String,
}

impl ProviderSettings {
    /// Load settings from the environment (after trying to load a `.env`
    /// file), falling back to the same defaults the original OpenWebUI
    /// pipeline valves used.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai_compat".to_string()),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://chat-ai.academiccloud.de/v1/".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_default_model: env::var("LLM_DEFAULT_MODEL").unwrap_or_default(),
            sparql_base_url: env::var("SPARQL_BASE_URL").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_min_iterations_to_max() {
        let cfg = EngineConfig {
            max_iterations: 2,
            min_iterations_before_early_stop: 10,
            ..EngineConfig::default()
        }
        .normalize();
        assert_eq!(cfg.min_iterations_before_early_stop, 2);
    }

    #[test]
    fn normalize_floors_zero_values_to_minimums() {
        let cfg = EngineConfig {
            lexical_max_tokens: 0,
            lexical_max_candidates: 0,
            max_iterations: 0,
            global_time_budget_sec: 0,
            max_query_chars: 10,
            ..EngineConfig::default()
        }
        .normalize();
        assert_eq!(cfg.lexical_max_tokens, 1);
        assert_eq!(cfg.lexical_max_candidates, 1);
        assert_eq!(cfg.max_iterations, 1);
        assert_eq!(cfg.global_time_budget_sec, 1);
        assert_eq!(cfg.max_query_chars, 256);
    }
}
