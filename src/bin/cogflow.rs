#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use cogflow::flows::{
    self, OptimizePromptInput, RecommendToolsInput, RefineInput, RefineOptions, RouteQueryInput,
    SelectModelInput,
};
use cogflow::{parse_model_list, validate_input, InputContract, Invoker, Settings};

#[derive(Parser)]
#[command(name = "cogflow", version, about = "Multi-step LLM orchestration CLI")]
struct Cli {
    /// Model for calls that do not name one (overrides COGFLOW_DEFAULT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,
    /// Write the JSON result to this file instead of stdout
    #[arg(long, global = true)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a query to creativeModel, mathematicalModel or generalModel
    Route {
        #[arg(long, conflicts_with = "request")]
        query: Option<String>,
        /// JSON request file: {"query": ...}
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Recommend up to three AI tools for a query
    Recommend {
        #[arg(long, conflicts_with = "request")]
        query: Option<String>,
        /// JSON request file: {"query": ...}
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Draft with several models, then critique and refine
    Refine {
        #[arg(long, conflicts_with = "request")]
        query: Option<String>,
        /// Comma-separated model ids, e.g. "openai/gpt-4o-mini, google/gemini-2.0-flash-001"
        #[arg(long, conflicts_with = "request")]
        models: Option<String>,
        /// Drafts requested at once (default: all)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Run each critique/refine round on that round's model
        #[arg(long)]
        peer_review: bool,
        /// JSON request file: {"query": ..., "modelNames": [...]}
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Iteratively improve a prompt through feedback rounds
    Optimize {
        #[arg(long, conflicts_with = "request")]
        prompt: Option<String>,
        /// Comma-separated model ids
        #[arg(long, conflicts_with = "request")]
        models: Option<String>,
        /// Number of rounds, 1 to 10
        #[arg(long, conflicts_with = "request")]
        rounds: Option<u32>,
        /// JSON request file: {"initialPrompt": ..., "optimizationRounds": n}
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Pick the most energy-efficient model for a task
    Select {
        #[arg(long, conflicts_with = "request")]
        task: Option<String>,
        /// Comma-separated candidate model ids
        #[arg(long, conflicts_with = "request")]
        models: Option<String>,
        /// JSON request file: {"taskDescription": ..., "availableModels": [...]}
        #[arg(long)]
        request: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(model) = cli.model {
        settings = settings.with_default_model(model);
    }
    let invoker = Invoker::from_settings(&settings)?;

    let result = match cli.command {
        Commands::Route { query, request } => {
            let input: RouteQueryInput = load_input(request, || json!({ "query": query }))?;
            serde_json::to_value(flows::route_query(&invoker, &input).await?)?
        }
        Commands::Recommend { query, request } => {
            let input: RecommendToolsInput = load_input(request, || json!({ "query": query }))?;
            serde_json::to_value(flows::recommend_tools(&invoker, &input).await?)?
        }
        Commands::Refine {
            query,
            models,
            concurrency,
            peer_review,
            request,
        } => {
            let input: RefineInput = load_input(request, || {
                json!({
                    "query": query,
                    "modelNames": models.as_deref().map(parse_model_list),
                })
            })?;
            let options = RefineOptions {
                concurrency,
                peer_review,
            };
            serde_json::to_value(flows::refine_collaboratively(&invoker, &input, &options).await?)?
        }
        Commands::Optimize {
            prompt,
            models,
            rounds,
            request,
        } => {
            let input: OptimizePromptInput = load_input(request, || {
                json!({
                    "initialPrompt": prompt,
                    "modelNames": models.as_deref().map(parse_model_list),
                    "optimizationRounds": rounds,
                })
            })?;
            serde_json::to_value(flows::optimize_prompt(&invoker, &input).await?)?
        }
        Commands::Select {
            task,
            models,
            request,
        } => {
            let input: SelectModelInput = load_input(request, || {
                json!({
                    "taskDescription": task,
                    "availableModels": models.as_deref().map(parse_model_list),
                })
            })?;
            serde_json::to_value(flows::select_efficient_model(&invoker, &input).await?)?
        }
    };

    match cli.out {
        Some(path) => write_json(&path, &result)?,
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

/// Take the request file when given, else the flags, and run it through the
/// input contract either way. Unset flags become nulls so they report as missing.
fn load_input<T: InputContract>(
    request: Option<PathBuf>,
    from_flags: impl FnOnce() -> Value,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = match request {
        Some(path) => read_json(&path)?,
        None => from_flags(),
    };
    Ok(validate_input(&raw)?)
}

fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json(path: &Path, value: &Value) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
