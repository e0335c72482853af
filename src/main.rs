use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use semantic_intervention::{
    config::{Config, LogFormat},
    intervention::{initialize_global, InterventionEngine, PipelineContext},
    langbase::LangbaseClient,
    server::{AppState, McpServer},
    thinking::{LangbaseThinkingService, ThinkingService, UnavailableThinkingService},
};

#[derive(Parser)]
#[command(name = "semantic-intervention")]
#[command(about = "Semantic risk and complexity triage for coding-assistant prompts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as MCP server over stdio (default)
    Serve,

    /// Print the semantic analysis of a prompt
    Analyze {
        /// Prompt to analyze
        prompt: String,
    },

    /// Run the full intervention pipeline on a prompt
    Pipeline {
        /// Prompt to evaluate
        prompt: String,

        /// File the task touches (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Estimated number of files to change
        #[arg(long)]
        estimated_files: Option<u32>,

        /// Estimated effort in minutes
        #[arg(long)]
        estimated_time: Option<u32>,
    },

    /// Check a response for refusal indicators
    Detect {
        /// Response text to inspect
        response: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Semantic intervention engine starting..."
    );

    let thinking = init_thinking(&config).await?;
    let engine = initialize_global(InterventionEngine::new(config.engine.clone(), thinking));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, engine).await,
        Commands::Analyze { prompt } => {
            let analysis = engine
                .analyze(Some(&prompt), &PipelineContext::default())
                .await;
            print_json(analysis.as_ref())
        }
        Commands::Pipeline {
            prompt,
            files,
            estimated_files,
            estimated_time,
        } => {
            let context = PipelineContext {
                files,
                estimated_files,
                estimated_time,
                ..Default::default()
            };
            let result = engine.run_pipeline(&prompt, &context).await;
            print_json(&result)
        }
        Commands::Detect { response } => {
            let detection = engine.detect_refusal(&Value::String(response)).await;
            print_json(&detection)
        }
    }
}

/// Build the thinking backend. Without an API key the engine runs rule-based only.
async fn init_thinking(config: &Config) -> anyhow::Result<Arc<dyn ThinkingService>> {
    let Some(langbase_config) = &config.langbase else {
        warn!("LANGBASE_API_KEY not set, running without a thinking backend");
        return Ok(Arc::new(UnavailableThinkingService));
    };

    let client = match LangbaseClient::new(langbase_config, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %langbase_config.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    info!("Ensuring thinking pipes exist...");
    if let Err(e) = client.ensure_role_pipes(&config.pipes).await {
        warn!(error = %e, "Failed to ensure thinking pipes, calls may fail");
    }

    Ok(Arc::new(LangbaseThinkingService::new(
        client,
        config.pipes.clone(),
    )))
}

async fn serve(config: Config, engine: Arc<InterventionEngine>) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config, engine));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
