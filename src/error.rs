use thiserror::Error;

/// Errors surfaced by an [`crate::llm::LlmAdapter`] implementation.
///
/// These are absorbed into evidence records or progress payloads rather than
/// bubbling out of [`crate::engine::SelfQueryEngine::process`] — see the
/// error handling design in `SPEC_FULL.md` §7.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limit exceeded")]
    RateLimit,
    #[error("authentication failed")]
    Authentication,
    #[error("request timed out")]
    Timeout,
}

/// Errors from the SPARQL endpoint driver.
#[derive(Error, Debug, Clone)]
pub enum SparqlError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("no endpoint candidates available")]
    NoCandidates,
}

/// Failures that prevent an engine (or adapter) from being constructed.
///
/// Per spec, this is the only class of error visible to the caller of the
/// core — once an engine is built, `process` never raises.
#[derive(Error, Debug)]
pub enum EngineBuildError {
    #[error("required field '{0}' is empty")]
    MissingField(&'static str),
    #[error("unsupported LLM provider '{0}'; expected 'ollama' or an openai-compatible alias")]
    UnsupportedProvider(String),
}
