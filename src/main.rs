//! semrag CLI - main entry point
//!
//! Offline build stages and query commands over the processed artifacts.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use anyhow::Context;
use semrag::semrag::engine::OVERVIEW_GRAPH_LIMIT;
use semrag::{commands, metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "semrag")]
#[command(about = "Knowledge-graph hybrid retrieval over a fixed corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config.yml, then built-in defaults)
    #[arg(short, long, env = "SEMRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the corpus into semantic chunks (chunks.json)
    Chunk {
        /// Corpus text file (defaults to paths.source_text)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Build the knowledge graph and communities from chunks.json
    Graph,

    /// Summarize every community (community_summaries.json)
    Summarize,

    /// Run chunk, graph and summarize in one go
    Build {
        /// Corpus text file (defaults to paths.source_text)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Answer a single question
    Ask {
        /// Question text
        query: String,

        /// Print the full response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Interactive question loop
    Chat,

    /// Export the highest-degree part of the graph as JSON
    Overview {
        /// Maximum number of nodes
        #[arg(short, long, default_value_t = OVERVIEW_GRAPH_LIMIT)]
        limit: usize,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Chunk { .. } => "chunk",
            Commands::Graph => "graph",
            Commands::Summarize => "summarize",
            Commands::Build { .. } => "build",
            Commands::Ask { .. } => "ask",
            Commands::Chat => "chat",
            Commands::Overview { .. } => "overview",
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::new().context("failed to load configuration"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("semrag=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = load_config(cli.config.as_ref())?;

    let command_name = cli.command.name();
    let start = Instant::now();

    let result = execute_command(cli.command, &config).await;

    metrics::record_command(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Chunk { input } => {
            commands::run_chunk(config, input.as_deref()).await?;
        }
        Commands::Graph => {
            commands::run_graph(config).await?;
        }
        Commands::Summarize => {
            commands::run_summarize(config).await?;
        }
        Commands::Build { input } => {
            commands::run_build(config, input.as_deref()).await?;
        }
        Commands::Ask { query, json } => {
            commands::run_ask(config, &query, json).await?;
        }
        Commands::Chat => {
            commands::run_chat(config).await?;
        }
        Commands::Overview { limit, output } => {
            commands::run_overview(config, limit, output.as_deref()).await?;
        }
    }
    Ok(())
}
