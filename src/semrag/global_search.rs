//! Theme-anchored retrieval over community summaries.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::result::SearchResult;
use super::vector::cosine_similarity;
use crate::config::Config;
use crate::embeddings::{embed_all, Embedder};
use crate::Result;

/// A community summary with its cached embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunitySummary {
    pub community_id: usize,
    pub summary: String,
    pub embedding: Vec<f32>,
}

impl CommunitySummary {
    pub fn provenance(&self) -> String {
        format!("Community {} Summary", self.community_id)
    }
}

pub struct GlobalSearch<E> {
    embedder: E,
    summaries: Vec<CommunitySummary>,
}

impl<E: Embedder> GlobalSearch<E> {
    /// Embed all summaries up front.
    pub async fn load(
        summaries: &BTreeMap<usize, String>,
        embedder: E,
        config: &Config,
    ) -> Result<Self> {
        info!("Encoding {} community summaries", summaries.len());
        let texts: Vec<String> = summaries.values().cloned().collect();
        let embeddings = embed_all(
            &embedder,
            &texts,
            config.chunking.embedding_batch_size,
            config.chunking.embedding_concurrency,
        )
        .await?;

        let summaries = summaries
            .iter()
            .zip(embeddings)
            .map(|((&community_id, summary), embedding)| CommunitySummary {
                community_id,
                summary: summary.clone(),
                embedding,
            })
            .collect();

        Ok(Self::with_summaries(embedder, summaries))
    }

    pub fn with_summaries(embedder: E, summaries: Vec<CommunitySummary>) -> Self {
        Self {
            embedder,
            summaries,
        }
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.len()
    }

    /// Top `top_k` summaries by similarity to `query`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if self.summaries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let mut results: Vec<SearchResult> = self
            .summaries
            .iter()
            .map(|s| {
                SearchResult::new(
                    s.summary.clone(),
                    cosine_similarity(&query_embedding, &s.embedding),
                    s.provenance(),
                )
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);

        debug!("Global search returned {} results", results.len());
        Ok(results)
    }
}
