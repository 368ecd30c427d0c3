//! Entity-anchored retrieval.
//!
//! The query is compared with every entity node; entities above the
//! threshold fan out to the chunks they appear in. A chunk reached from
//! several relevant entities is corroborated and scores higher than one
//! reached from a single entity.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::chunker::{chunk_key, parse_chunk_key};
use super::graph::KnowledgeGraph;
use super::result::SearchResult;
use super::vector::cosine_similarity;
use crate::config::Config;
use crate::embeddings::{embed_all, Embedder};
use crate::Result;

/// Score accumulated for one chunk across the entities that reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    /// Highest entity similarity seen for the chunk
    pub best: f32,
    /// Entity that contributed `best`
    pub provenance: String,
    /// Number of entities that reached the chunk
    pub hits: u32,
}

impl Evidence {
    pub fn single(similarity: f32, entity: &str) -> Self {
        Self {
            best: similarity,
            provenance: entity.to_string(),
            hits: 1,
        }
    }

    /// Final score: best similarity plus `boost` per extra corroborating entity.
    pub fn score(&self, boost: f32) -> f32 {
        self.best + boost * self.hits.saturating_sub(1) as f32
    }
}

/// Merge two accumulations for the same chunk.
///
/// Commutative and associative in the score, so the final ranking does not
/// depend on which entity reached a chunk first. On equal `best` the left
/// provenance is kept.
pub fn combine(existing: Evidence, contribution: Evidence) -> Evidence {
    let (best, provenance) = if contribution.best > existing.best {
        (contribution.best, contribution.provenance)
    } else {
        (existing.best, existing.provenance)
    };
    Evidence {
        best,
        provenance,
        hits: existing.hits + contribution.hits,
    }
}

/// Local search over a shared graph snapshot.
pub struct LocalSearch<E> {
    graph: Arc<KnowledgeGraph>,
    embedder: E,
    entities: Vec<(String, Vec<f32>)>,
    max_seed_entities: usize,
    boost: f32,
}

impl<E: Embedder> LocalSearch<E> {
    /// Embed every entity node once; the cache is complete before this
    /// returns.
    pub async fn load(graph: Arc<KnowledgeGraph>, embedder: E, config: &Config) -> Result<Self> {
        let names: Vec<String> = graph.entities().map(|n| n.id.clone()).collect();
        info!("Caching embeddings for {} entities", names.len());

        let embeddings = embed_all(
            &embedder,
            &names,
            config.chunking.embedding_batch_size,
            config.chunking.embedding_concurrency,
        )
        .await?;

        let entities = names.into_iter().zip(embeddings).collect();
        Ok(Self::with_entity_embeddings(graph, embedder, entities, config))
    }

    /// Build from precomputed `(entity, embedding)` pairs.
    pub fn with_entity_embeddings(
        graph: Arc<KnowledgeGraph>,
        embedder: E,
        entities: Vec<(String, Vec<f32>)>,
        config: &Config,
    ) -> Self {
        Self {
            graph,
            embedder,
            entities,
            max_seed_entities: config.retrieval.max_seed_entities,
            boost: config.retrieval.corroboration_boost,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    /// Entities with similarity strictly above `threshold`, best first,
    /// capped at the seed fan-out.
    fn seed_entities(&self, query_embedding: &[f32], threshold: f32) -> Vec<(&str, f32)> {
        let mut seeds: Vec<(&str, f32)> = self
            .entities
            .iter()
            .map(|(name, embedding)| (name.as_str(), cosine_similarity(query_embedding, embedding)))
            .filter(|(_, similarity)| *similarity > threshold)
            .collect();

        seeds.sort_by(|a, b| b.1.total_cmp(&a.1));
        seeds.truncate(self.max_seed_entities);
        seeds
    }

    /// Top `top_k` chunks for `query`, scores non-increasing.
    pub async fn search(&self, query: &str, top_k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        if self.entities.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let seeds = self.seed_entities(&query_embedding, threshold);
        debug!(seeds = seeds.len(), "Local search seed entities");

        let mut order: Vec<usize> = Vec::new();
        let mut collected: HashMap<usize, Evidence> = HashMap::new();

        for (entity, similarity) in &seeds {
            for neighbor in self.graph.neighbors(entity) {
                let Some(chunk_id) = parse_chunk_key(&neighbor.id) else {
                    continue;
                };
                let contribution = Evidence::single(*similarity, entity);
                match collected.remove(&chunk_id) {
                    Some(existing) => {
                        collected.insert(chunk_id, combine(existing, contribution));
                    }
                    None => {
                        order.push(chunk_id);
                        collected.insert(chunk_id, contribution);
                    }
                }
            }
        }

        let mut results: Vec<SearchResult> = order
            .into_iter()
            .filter_map(|chunk_id| {
                let evidence = collected.remove(&chunk_id)?;
                let text = self
                    .graph
                    .node(&chunk_key(chunk_id))?
                    .text
                    .clone()
                    .unwrap_or_default();
                Some(SearchResult::new(text, evidence.score(self.boost), evidence.provenance))
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);

        debug!("Local search returned {} results", results.len());
        Ok(results)
    }
}
