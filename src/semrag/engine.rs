//! Offline build pipeline and the per-query engine.
//!
//! [`BuildPipeline`] turns a corpus into the persisted artifacts:
//! sentences → chunks → knowledge graph → communities → summaries.
//! [`QueryEngine`] loads those artifacts once, then answers queries with
//! local + global retrieval, re-ranking, fusion and cited generation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::answer::{AnswerGenerator, Generator};
use super::chunker::{Chunk, SemanticChunker};
use super::community::{partition, CommunityDetector, CommunityPartition};
use super::entity_extractor::EntityExtractor;
use super::fusion::ResultFusion;
use super::global_search::GlobalSearch;
use super::graph::{GraphBuilder, GraphData, KnowledgeGraph};
use super::local_search::LocalSearch;
use super::merger::ChunkMerger;
use super::ranker::{Ranker, RelevanceScorer};
use super::result::SearchResult;
use super::sentences::{clean_text, split_sentences};
use super::store::{ArtifactStore, Manifest};
use super::summarizer::CommunitySummarizer;
use crate::config::{Config, RetrievalConfig};
use crate::embeddings::{embed_all, Embedder};
use crate::metrics::{self, Collaborator, Stage};
use crate::prompts::PromptSet;
use crate::{Error, Result};

/// Nodes returned with a chat response.
pub const EVIDENCE_GRAPH_LIMIT: usize = 20;
/// Nodes in the graph overview.
pub const OVERVIEW_GRAPH_LIMIT: usize = 300;

pub struct BuildPipeline<E, X, D, G> {
    config: Config,
    store: ArtifactStore,
    embedder: E,
    extractor: X,
    detector: D,
    generator: G,
    prompts: PromptSet,
}

impl<E, X, D, G> BuildPipeline<E, X, D, G>
where
    E: Embedder,
    X: EntityExtractor,
    D: CommunityDetector,
    G: Generator,
{
    pub fn new(
        config: &Config,
        embedder: E,
        extractor: X,
        detector: D,
        generator: G,
        prompts: PromptSet,
    ) -> Self {
        Self {
            config: config.clone(),
            store: ArtifactStore::from_config(&config.paths),
            embedder,
            extractor,
            detector,
            generator,
            prompts,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Read the corpus from `input`, or from `paths.source_text`.
    pub async fn read_corpus(&self, input: Option<&Path>) -> Result<String> {
        let path = input.unwrap_or(self.config.paths.source_text.as_path());
        match fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::MissingArtifact(
                format!("source text {} not found", path.display()),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Clean, split, embed and merge `text` into chunks.
    pub async fn chunk_text(&self, text: &str) -> Result<Vec<Chunk>> {
        let cleaned = clean_text(text);
        let sentences = split_sentences(&cleaned, self.config.chunking.min_sentence_chars);
        info!(sentences = sentences.len(), "Embedding sentences");

        let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
        let embeddings = embed_all(
            &self.embedder,
            &texts,
            self.config.chunking.embedding_batch_size,
            self.config.chunking.embedding_concurrency,
        )
        .await?;

        let chunker = SemanticChunker::new(ChunkMerger::from_config(&self.config.chunking));
        let chunks = chunker.chunk(&sentences, &embeddings)?;
        info!(
            sentences = sentences.len(),
            chunks = chunks.len(),
            "Semantic chunking complete"
        );
        Ok(chunks)
    }

    /// Build the graph and partition it. A failing detector leaves the
    /// partition empty.
    pub fn build_graph(&self, chunks: &[Chunk]) -> Result<(KnowledgeGraph, CommunityPartition)> {
        let graph = GraphBuilder::new(&self.extractor).build(chunks)?;
        let communities = partition(&self.detector, &graph);
        Ok((graph, communities))
    }

    pub async fn summarize(
        &self,
        graph: &KnowledgeGraph,
        communities: &CommunityPartition,
    ) -> BTreeMap<usize, String> {
        CommunitySummarizer::new(
            &self.generator,
            self.prompts.clone(),
            self.config.retrieval.summary_chunks,
        )
        .summarize(graph, communities)
        .await
    }

    /// Corpus → `chunks.json`.
    pub async fn run_chunk_stage(&self, input: Option<&Path>) -> Result<Vec<Chunk>> {
        metrics::timed(Stage::Chunk, async {
            let text = self.read_corpus(input).await?;
            let chunks = self.chunk_text(&text).await?;
            self.store.save_chunks(&chunks).await?;
            Ok::<_, Error>(chunks)
        })
        .await
    }

    /// `chunks.json` → `knowledge_graph.json` + `communities.json`.
    pub async fn run_graph_stage(&self) -> Result<(KnowledgeGraph, CommunityPartition)> {
        metrics::timed(Stage::Graph, async {
            let chunks = self.store.load_chunks().await?;
            self.graph_stage(&chunks).await
        })
        .await
    }

    async fn graph_stage(&self, chunks: &[Chunk]) -> Result<(KnowledgeGraph, CommunityPartition)> {
        let (graph, communities) = self.build_graph(chunks)?;
        self.store.save_graph(&graph).await?;
        self.store.save_communities(&communities).await?;
        Ok((graph, communities))
    }

    /// Graph + communities → `community_summaries.json`.
    pub async fn run_summarize_stage(&self) -> Result<BTreeMap<usize, String>> {
        metrics::timed(Stage::Summarize, async {
            let graph = self.store.load_graph().await?;
            let communities = self.store.load_communities().await?;
            self.summarize_stage(&graph, &communities).await
        })
        .await
    }

    async fn summarize_stage(
        &self,
        graph: &KnowledgeGraph,
        communities: &CommunityPartition,
    ) -> Result<BTreeMap<usize, String>> {
        let summaries = self.summarize(graph, communities).await;
        self.store.save_summaries(&summaries).await?;
        Ok(summaries)
    }

    /// Every stage in order, then `manifest.json`. Any stage error aborts
    /// the build.
    pub async fn run(&self, input: Option<&Path>) -> Result<Manifest> {
        metrics::timed(Stage::Build, async {
            let chunks = self.run_chunk_stage(input).await?;
            let (graph, communities) =
                metrics::timed(Stage::Graph, self.graph_stage(&chunks)).await?;
            let summaries =
                metrics::timed(Stage::Summarize, self.summarize_stage(&graph, &communities)).await?;

            let manifest = Manifest {
                built_at: Utc::now(),
                chunk_count: chunks.len(),
                node_count: graph.node_count(),
                edge_count: graph.edge_count(),
                community_count: communities.len(),
                summary_count: summaries.len(),
                embedding_provider: self.config.embedding.provider.as_str().to_string(),
                embedding_model: self.config.embedding.model.clone(),
            };
            self.store.save_manifest(&manifest).await?;

            info!(
                chunks = manifest.chunk_count,
                nodes = manifest.node_count,
                communities = manifest.community_count,
                "Build complete"
            );
            Ok::<_, Error>(manifest)
        })
        .await
    }
}

/// Search result as returned to callers: plain `f64` scores, never NaN or
/// infinite, no embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub text: String,
    pub score: f64,
    pub provenance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

fn finite(value: f32) -> f64 {
    if value.is_finite() {
        f64::from(value)
    } else {
        0.0
    }
}

impl From<&SearchResult> for ContextItem {
    fn from(result: &SearchResult) -> Self {
        Self {
            text: result.text.clone(),
            score: finite(result.score),
            provenance: result.provenance.clone(),
            rerank_score: result.rerank_score.map(finite),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    /// Vector score of the top re-ranked local result
    pub confidence: f64,
    pub source_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseContext {
    pub local: Vec<ContextItem>,
    pub global: Vec<ContextItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Answer text followed by its source list
    pub answer: String,
    pub metrics: ResponseMetrics,
    pub context: ResponseContext,
    pub graph_data: GraphData,
}

/// Serves queries against one immutable snapshot of the artifacts.
pub struct QueryEngine<E, S, G> {
    retrieval: RetrievalConfig,
    graph: Arc<KnowledgeGraph>,
    local: LocalSearch<Arc<E>>,
    global: GlobalSearch<Arc<E>>,
    ranker: Ranker<S>,
    fusion: ResultFusion,
    answers: AnswerGenerator<G>,
}

impl<E, S, G> QueryEngine<E, S, G>
where
    E: Embedder,
    S: RelevanceScorer,
    G: Generator,
{
    /// Load the graph and summaries from `store`. Either file missing is
    /// fatal.
    pub async fn load(
        store: &ArtifactStore,
        config: &Config,
        embedder: E,
        scorer: S,
        generator: G,
        prompts: PromptSet,
    ) -> Result<Self> {
        let graph = store.load_graph().await?;
        let summaries = store.load_summaries().await?;
        Self::new(config, Arc::new(graph), &summaries, embedder, scorer, generator, prompts).await
    }

    /// Embed entity names and summaries; returns once both caches are
    /// complete.
    pub async fn new(
        config: &Config,
        graph: Arc<KnowledgeGraph>,
        summaries: &BTreeMap<usize, String>,
        embedder: E,
        scorer: S,
        generator: G,
        prompts: PromptSet,
    ) -> Result<Self> {
        let embedder = Arc::new(embedder);
        let (local, global) = tokio::try_join!(
            LocalSearch::load(Arc::clone(&graph), Arc::clone(&embedder), config),
            GlobalSearch::load(summaries, Arc::clone(&embedder), config),
        )?;

        info!(
            entities = local.entity_count(),
            summaries = global.summary_count(),
            "Query engine ready"
        );

        Ok(Self {
            retrieval: config.retrieval.clone(),
            graph,
            local,
            global,
            ranker: Ranker::new(scorer),
            fusion: ResultFusion::from_config(&config.retrieval),
            answers: AnswerGenerator::new(generator, prompts),
        })
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Subgraph of the highest-degree nodes.
    pub fn overview(&self, limit: usize) -> GraphData {
        self.graph.top_degree_subgraph(limit)
    }

    /// Answer one query. Retrieval or generation failures degrade the
    /// response instead of failing it.
    pub async fn ask(&self, query: &str) -> Result<ChatResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("query is empty".into()));
        }
        metrics::timed(Stage::Query, self.answer(query)).await
    }

    async fn answer(&self, query: &str) -> Result<ChatResponse> {
        let r = &self.retrieval;

        let local = self
            .local
            .search(query, r.local_top_k, r.local_threshold)
            .await
            .unwrap_or_else(|err| degraded_search("local", err));
        let global = self
            .global
            .search(query, r.global_top_k)
            .await
            .unwrap_or_else(|err| degraded_search("global", err));

        let reranked = self.ranker.rerank(local, query, r.rerank_top_k).await;
        let shown_local = &reranked[..reranked.len().min(r.context_local)];
        let shown_global = &global[..global.len().min(r.context_global)];

        let context = self.fusion.fuse(shown_local, shown_global);
        let answer = self.answers.generate(query, &context).await;

        let local_items: Vec<ContextItem> = shown_local.iter().map(ContextItem::from).collect();
        let global_items: Vec<ContextItem> = shown_global.iter().map(ContextItem::from).collect();
        let confidence = local_items.first().map(|item| item.score).unwrap_or(0.0);

        Ok(ChatResponse {
            answer: answer.to_string(),
            metrics: ResponseMetrics {
                confidence,
                source_count: local_items.len() + global_items.len(),
            },
            graph_data: self.evidence_subgraph(shown_local),
            context: ResponseContext {
                local: local_items,
                global: global_items,
            },
        })
    }

    /// Graph nodes whose id occurs, case-insensitively, in the evidence
    /// texts. Graph order, at most [`EVIDENCE_GRAPH_LIMIT`] nodes.
    pub fn evidence_subgraph(&self, results: &[SearchResult]) -> GraphData {
        let haystack = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let ids: Vec<&str> = self
            .graph
            .nodes()
            .map(|n| n.id.as_str())
            .filter(|id| haystack.contains(&id.to_lowercase()))
            .take(EVIDENCE_GRAPH_LIMIT)
            .collect();

        self.graph.subgraph(ids)
    }
}

fn degraded_search(path: &str, err: Error) -> Vec<SearchResult> {
    warn!("{} search failed, continuing without it: {}", path, err);
    metrics::record_degraded(Collaborator::Embedder);
    Vec::new()
}
