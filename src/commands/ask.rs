//! Serving commands: ask, chat, overview.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Config;
use crate::embeddings::EmbedBackend;
use crate::integrations::OllamaGenerator;
use crate::prompts::PromptSet;
use crate::semrag::{ArtifactStore, ChatResponse, QueryEngine, ScoreBackend};

pub type DefaultEngine = QueryEngine<EmbedBackend, ScoreBackend, OllamaGenerator>;

/// Load artifacts and wire the configured backends.
pub async fn load_engine(config: &Config) -> Result<DefaultEngine> {
    let store = ArtifactStore::from_config(&config.paths);
    let embedder = EmbedBackend::from_config(&config.embedding, config.llm.timeout_secs)
        .context("failed to set up embedding backend")?;
    let scorer = ScoreBackend::from_config(&config.rerank, config.llm.timeout_secs)
        .context("failed to set up relevance scorer")?;
    let generator =
        OllamaGenerator::from_config(&config.llm).context("failed to set up generator")?;

    QueryEngine::load(&store, config, embedder, scorer, generator, PromptSet::load())
        .await
        .with_context(|| format!("failed to load artifacts from {}", store.dir().display()))
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);
    println!(
        "\n(confidence {:.3}, {} sources)",
        response.metrics.confidence, response.metrics.source_count
    );
}

pub async fn run_ask(config: &Config, query: &str, json: bool) -> Result<()> {
    let engine = load_engine(config).await?;
    let response = engine.ask(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

/// Interactive loop until `exit`, `quit` or end of input.
pub async fn run_chat(config: &Config) -> Result<()> {
    let engine = load_engine(config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ready. Type a question, or 'exit' to quit.");
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match engine.ask(query).await {
            Ok(response) => print_response(&response),
            Err(err) => eprintln!("Error: {}", err),
        }
    }
    Ok(())
}

/// Write the top-degree subgraph as JSON to `output` or stdout.
pub async fn run_overview(config: &Config, limit: usize, output: Option<&Path>) -> Result<()> {
    let store = ArtifactStore::from_config(&config.paths);
    let graph = store
        .load_graph()
        .await
        .context("failed to load knowledge graph")?;

    let data = graph.top_degree_subgraph(limit);
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "Wrote {} nodes and {} links to {}",
                data.nodes.len(),
                data.links.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
