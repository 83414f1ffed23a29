pub mod config;
pub mod engine;
pub mod error;
pub mod lexical;
pub mod llm;
pub mod packer;
pub mod planner;
pub mod progress;
pub mod schema;
pub mod scorer;
pub mod sparql;

pub use config::EngineConfig;
pub use engine::{ProcessResult, SelfQueryEngine};
pub use error::{EngineBuildError, LlmError, SparqlError};
pub use llm::{build_adapter, ChatMessage, LlmAdapter, ModelInfo};
pub use packer::QueryEvidence;
pub use progress::{ProgressEvent, ProgressSink, ProgressStage};
pub use schema::SchemaContext;
pub use sparql::QueryType;
