//! Client for a cross-encoder rerank service (`POST /rerank`).
//!
//! Speaks the text-embeddings-inference wire format: the request carries the
//! query and candidate texts, the response lists `{index, score}` pairs in
//! arbitrary order.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::semrag::ranker::RelevanceScorer;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RerankClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
}

#[derive(Debug, Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

impl RerankClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::ConnectionError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Raw cross-encoder scores, one per text, in text order.
    pub async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(format!("{}/rerank", self.base_url))
            .json(&RerankRequest {
                query,
                texts,
                raw_scores: true,
            })
            .send()
            .await
            .map_err(|e| Error::ConnectionError(format!("Rerank request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Scoring(format!("Rerank error {}: {}", status, text)));
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| Error::Scoring(format!("Invalid response: {}", e)))?;

        let mut scores: Vec<Option<f32>> = vec![None; texts.len()];
        for item in ranked {
            match scores.get_mut(item.index) {
                Some(slot) => *slot = Some(item.score),
                None => {
                    return Err(Error::Scoring(format!(
                        "Rerank index {} out of range for {} texts",
                        item.index,
                        texts.len()
                    )))
                }
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| Error::Scoring(format!("No score for text {}", i))))
            .collect()
    }
}

impl RelevanceScorer for RerankClient {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        self.rerank(query, passages).await
    }
}
