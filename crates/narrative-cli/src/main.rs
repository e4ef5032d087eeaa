// crates/narrative-cli/src/main.rs
// ============================================================================
// Module: Narrative Engine CLI Entry Point
// Description: Command dispatcher for the engine's HTTP server and offline
//              story-inspection utilities.
// Purpose: A small, localized entry point — load configuration, build the
//          engine's collaborators, and either serve or run one utility.
// Dependencies: clap, narrative-config, narrative-service, narrative-core,
//               narrative-store-sqlite, narrative-extractor, tokio, tracing.
// ============================================================================

//! ## Overview
//! A command-dispatcher binary (clap subcommands, a thiserror-backed
//! `CliError`, `ExitCode` returns) with one server command plus two offline
//! utilities (`inspect`, `replay`) that only need a `SqliteStore` and no
//! network access.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use narrative_config::EngineConfig;
use narrative_core::identifiers::StoryId;
use narrative_core::interfaces::EventLog;
use narrative_core::interfaces::LLMClient;
use narrative_core::interfaces::StateStore;
use narrative_extractor::HttpLlmClient;
use narrative_extractor::HttpLlmConfig;
use narrative_service::AppState;
use narrative_store_sqlite::SqliteStore;
use narrative_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "narrative-engine", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the engine's HTTP server.
    Serve(ServeCommand),
    /// Print a story's current canonical state as JSON.
    Inspect(InspectCommand),
    /// Print a story's most recent committed events as JSON.
    Replay(ReplayCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Address to bind the HTTP server to.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

/// Configuration for the `inspect` command.
#[derive(Args, Debug)]
struct InspectCommand {
    /// Story identifier to inspect.
    #[arg(long, value_name = "STORY_ID")]
    story_id: String,
}

/// Configuration for the `replay` command.
#[derive(Args, Debug)]
struct ReplayCommand {
    /// Story identifier to replay.
    #[arg(long, value_name = "STORY_ID")]
    story_id: String,
    /// Number of most recent events to print.
    #[arg(long, value_name = "N", default_value_t = 20)]
    limit: usize,
}

/// Top-level CLI error.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load from the environment.
    #[error("configuration error: {0}")]
    Config(#[from] narrative_config::ConfigError),
    /// The LLM client could not be constructed.
    #[error("llm client error: {0}")]
    Llm(#[from] narrative_core::interfaces::LlmError),
    /// The state store could not be opened.
    #[error("state store error: {0}")]
    Store(#[from] narrative_store_sqlite::SqliteStoreError),
    /// The requested story has never been created.
    #[error("story not found: {0}")]
    StoryNotFound(String),
    /// The HTTP server failed while serving.
    #[error("server error: {0}")]
    Server(String),
    /// A store-trait call failed (load/save or event-log read).
    #[error("{0}")]
    StoreTrait(String),
}

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "narrative-engine exited with an error");
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Inspect(command) => command_inspect(&command),
        Commands::Replay(command) => command_replay(&command),
    }
}

/// Opens the `SqliteStore` from environment configuration, shared by every
/// subcommand.
fn open_store(config: &EngineConfig) -> Result<SqliteStore, CliError> {
    Ok(SqliteStore::new(SqliteStoreConfig::new(config.state_db_path.clone()))?)
}

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> Result<(), CliError> {
    let config = EngineConfig::from_env()?;
    let store = Arc::new(open_store(&config)?);
    let llm_config = HttpLlmConfig {
        api_key: config.llm_api_key,
        base_url: config.llm_base_url,
        model: config.llm_model,
        ..HttpLlmConfig::default()
    };
    let llm: Arc<dyn LLMClient + Send + Sync> = Arc::new(HttpLlmClient::new(llm_config)?);
    let state = AppState::new(store, llm);
    let router = narrative_service::router(state);

    tracing::info!(bind = %command.bind, "starting narrative-engine server");
    let listener = tokio::net::TcpListener::bind(command.bind)
        .await
        .map_err(|e| CliError::Server(e.to_string()))?;
    axum::serve(listener, router).await.map_err(|e| CliError::Server(e.to_string()))?;
    Ok(())
}

/// Executes the `inspect` command.
fn command_inspect(command: &InspectCommand) -> Result<(), CliError> {
    let config = EngineConfig::from_env()?;
    let store = open_store(&config)?;
    let story_id = StoryId::new(command.story_id.clone());
    let state = store
        .load(&story_id)
        .map_err(|e| CliError::StoreTrait(e.to_string()))?
        .ok_or_else(|| CliError::StoryNotFound(command.story_id.clone()))?;
    let json = serde_json::to_string_pretty(&state).map_err(|e| CliError::StoreTrait(e.to_string()))?;
    println!("{json}");
    Ok(())
}

/// Executes the `replay` command.
fn command_replay(command: &ReplayCommand) -> Result<(), CliError> {
    let config = EngineConfig::from_env()?;
    let store = open_store(&config)?;
    let story_id = StoryId::new(command.story_id.clone());
    let events = store
        .list_recent(&story_id, command.limit, 0)
        .map_err(|e| CliError::StoreTrait(e.to_string()))?;
    let json = serde_json::to_string_pretty(&events).map_err(|e| CliError::StoreTrait(e.to_string()))?;
    println!("{json}");
    Ok(())
}
