//! Delve CLI
//!
//! Main entry point for the delve command-line tool.
//! Answers research questions from local documents and the web.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, DocsCommand, ReportCommand, SessionsCommand, StatusCommand};
use delve_core::{config::AppConfig, logging, AppResult};
use delve_research::ResearchEngine;
use std::path::PathBuf;

/// Delve - cited answers from your documents and the web
#[derive(Parser, Debug)]
#[command(name = "delve")]
#[command(about = "Cited research answers from local documents and the web", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "DELVE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "DELVE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, openai, groq)
    #[arg(short, long, global = true, env = "DELVE_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "DELVE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a question
    Ask(AskCommand),

    /// Manage the local document corpus
    Docs(DocsCommand),

    /// Write the report of a research session
    Report(ReportCommand),

    /// List or purge saved research sessions
    Sessions(SessionsCommand),

    /// Show corpus and provider status
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Delve CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.llm.provider);
    tracing::debug!("Model: {}", config.llm.model);

    config.validate()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Docs(_) => "docs",
        Commands::Report(_) => "report",
        Commands::Sessions(_) => "sessions",
        Commands::Status(_) => "status",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let engine = ResearchEngine::open(&config).await?;

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&engine).await,
        Commands::Docs(cmd) => cmd.execute(&engine).await,
        Commands::Report(cmd) => cmd.execute(&engine).await,
        Commands::Sessions(cmd) => cmd.execute(&engine).await,
        Commands::Status(cmd) => cmd.execute(&engine).await,
    };

    // Persist the index even when the command failed part-way
    let shutdown = engine.shutdown().await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.and(shutdown)
}
