//! Offline build commands: chunk, graph, summarize, build.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::embeddings::EmbedBackend;
use crate::integrations::OllamaGenerator;
use crate::metrics;
use crate::prompts::PromptSet;
use crate::semrag::{BuildPipeline, HeuristicExtractor, LabelPropagation};

pub type DefaultPipeline =
    BuildPipeline<EmbedBackend, HeuristicExtractor, LabelPropagation, OllamaGenerator>;

/// Pipeline wired to the configured backends.
pub fn pipeline(config: &Config) -> Result<DefaultPipeline> {
    let embedder = EmbedBackend::from_config(&config.embedding, config.llm.timeout_secs)
        .context("failed to set up embedding backend")?;
    let generator =
        OllamaGenerator::from_config(&config.llm).context("failed to set up generator")?;

    Ok(BuildPipeline::new(
        config,
        embedder,
        HeuristicExtractor::new(),
        LabelPropagation::from_config(&config.community),
        generator,
        PromptSet::load(),
    ))
}

pub async fn run_chunk(config: &Config, input: Option<&Path>) -> Result<()> {
    let pipeline = pipeline(config)?;
    let chunks = pipeline
        .run_chunk_stage(input)
        .await
        .context("chunking failed")?;

    println!(
        "Created {} chunks in {}",
        chunks.len(),
        pipeline.store().dir().display()
    );
    Ok(())
}

pub async fn run_graph(config: &Config) -> Result<()> {
    let pipeline = pipeline(config)?;
    let (graph, communities) = pipeline
        .run_graph_stage()
        .await
        .context("graph construction failed")?;

    println!(
        "Graph: {} nodes, {} edges, {} communities",
        graph.node_count(),
        graph.edge_count(),
        communities.len()
    );
    Ok(())
}

pub async fn run_summarize(config: &Config) -> Result<()> {
    let pipeline = pipeline(config)?;
    let summaries = pipeline
        .run_summarize_stage()
        .await
        .context("summarization failed")?;

    println!("Generated {} community summaries", summaries.len());
    Ok(())
}

pub async fn run_build(config: &Config, input: Option<&Path>) -> Result<()> {
    let pipeline = pipeline(config)?;
    info!(dir = %pipeline.store().dir().display(), "Starting full build");

    let manifest = pipeline.run(input).await.context("build failed")?;
    metrics::record_build(&manifest);

    println!("Build complete at {}", manifest.built_at.to_rfc3339());
    println!("  chunks:      {}", manifest.chunk_count);
    println!("  nodes:       {}", manifest.node_count);
    println!("  edges:       {}", manifest.edge_count);
    println!("  communities: {}", manifest.community_count);
    println!("  summaries:   {}", manifest.summary_count);
    Ok(())
}
