//! Minimal CLI standing in for the pipeline frontend: wires a live LLM
//! adapter and SPARQL endpoint to `selfquery_core::SelfQueryEngine` and
//! prints the packed answer context. Not a reimplementation of the
//! OpenWebUI pipeline contract — just enough to exercise the crate
//! end-to-end, in the spirit of the teacher's `src/bin/benchmark.rs`.

use std::sync::Arc;

use clap::Parser;
use selfquery_core::config::{EngineConfig, ProviderSettings};
use selfquery_core::progress::ProgressEvent;
use selfquery_core::{build_adapter, SelfQueryEngine};

#[derive(Parser, Debug)]
#[command(about = "Run the self-query retrieval loop against a live SPARQL endpoint")]
struct Args {
    /// Natural-language question to answer.
    question: String,

    /// SPARQL endpoint URL. Defaults to SPARQL_BASE_URL from the environment.
    #[arg(long)]
    endpoint: Option<String>,

    /// LLM provider: "ollama" or an openai-compatible alias.
    #[arg(long)]
    provider: Option<String>,

    /// LLM base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// LLM API key.
    #[arg(long)]
    api_key: Option<String>,

    /// Model id to use for planning.
    #[arg(long)]
    model: Option<String>,

    /// Suppress per-iteration progress lines.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = ProviderSettings::from_env();

    let endpoint = args.endpoint.unwrap_or(settings.sparql_base_url);
    let provider = args.provider.unwrap_or(settings.llm_provider);
    let base_url = args.base_url.unwrap_or(settings.llm_base_url);
    let api_key = args.api_key.unwrap_or(settings.llm_api_key);
    let model = args.model.unwrap_or(settings.llm_default_model);

    let adapter = build_adapter(&provider, &base_url, &api_key)?;
    let engine = SelfQueryEngine::build(endpoint, EngineConfig::default())?;

    let progress = if args.quiet {
        None
    } else {
        let sink: selfquery_core::ProgressSink = Arc::new(|event: ProgressEvent| {
            eprintln!("[{:?}] {}", event.stage, event.description);
        });
        Some(sink)
    };

    let result = engine.process(adapter.as_ref(), &model, &args.question, progress).await;

    println!("iterations used: {}", result.iterations_used);
    println!("stop reason: {}", result.stop_reason);
    println!("queries executed: {}", result.queries.len());
    println!("\n--- answer context ---\n{}", result.context);

    Ok(())
}
