//! Second-pass relevance re-ranking.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tracing::{debug, warn};

use super::result::SearchResult;
use crate::config::{RerankConfig, RerankProvider};
use crate::integrations::rerank::RerankClient;
use crate::metrics::{self, Collaborator};
use crate::{Error, Result};

/// Pairwise (query, passage) relevance. Higher is more relevant; no fixed
/// range.
pub trait RelevanceScorer: Send + Sync {
    /// One score per passage, in passage order.
    fn score(&self, query: &str, passages: &[String]) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Offline scorer: IDF-weighted share of query terms found in the passage.
///
/// IDF is computed over the candidate set, so terms present in every
/// candidate count least.
#[derive(Debug, Clone, Default)]
pub struct LexicalScorer;

fn terms(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| t.chars().count() > 2)
        .collect()
}

impl LexicalScorer {
    pub fn score_passages(&self, query: &str, passages: &[String]) -> Vec<f32> {
        let query_terms = terms(query);
        let passage_terms: Vec<HashSet<String>> = passages.iter().map(|p| terms(p)).collect();
        if query_terms.is_empty() || passages.is_empty() {
            return vec![0.0; passages.len()];
        }

        let n = passages.len() as f32;
        let idf: HashMap<&str, f32> = query_terms
            .iter()
            .map(|term| {
                let df = passage_terms.iter().filter(|p| p.contains(term)).count() as f32;
                (term.as_str(), (1.0 + n / (1.0 + df)).ln())
            })
            .collect();
        let total: f32 = idf.values().sum();

        passage_terms
            .iter()
            .map(|p| {
                let matched: f32 = idf
                    .iter()
                    .filter(|(term, _)| p.contains(**term))
                    .map(|(_, w)| w)
                    .sum();
                if total > 0.0 {
                    matched / total
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl RelevanceScorer for LexicalScorer {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        Ok(self.score_passages(query, passages))
    }
}

/// Relevance scorer selected from configuration.
pub enum ScoreBackend {
    Lexical(LexicalScorer),
    Remote(RerankClient),
}

impl ScoreBackend {
    pub fn from_config(config: &RerankConfig, timeout_secs: u64) -> Result<Self> {
        Ok(match config.provider {
            RerankProvider::Lexical => ScoreBackend::Lexical(LexicalScorer),
            RerankProvider::Remote => ScoreBackend::Remote(RerankClient::new(&config.url, timeout_secs)?),
        })
    }
}

impl RelevanceScorer for ScoreBackend {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        match self {
            ScoreBackend::Lexical(lexical) => lexical.score(query, passages).await,
            ScoreBackend::Remote(remote) => remote.score(query, passages).await,
        }
    }
}

pub struct Ranker<S> {
    scorer: S,
}

impl<S: RelevanceScorer> Ranker<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    /// Re-score `results` against `query` and keep the best `top_k`.
    ///
    /// Ties keep input order. If the scorer fails, the input order is kept
    /// (truncated) and no `rerank_score` is attached.
    pub async fn rerank(&self, mut results: Vec<SearchResult>, query: &str, top_k: usize) -> Vec<SearchResult> {
        if results.is_empty() {
            return results;
        }

        let passages: Vec<String> = results.iter().map(|r| r.text.clone()).collect();
        let scores = match self.scorer.score(query, &passages).await {
            Ok(scores) if scores.len() == results.len() => scores,
            Ok(scores) => {
                let err = Error::Scoring(format!(
                    "{} scores for {} passages",
                    scores.len(),
                    results.len()
                ));
                return Self::degrade(results, top_k, err);
            }
            Err(err) => return Self::degrade(results, top_k, err),
        };

        for (result, score) in results.iter_mut().zip(scores) {
            result.rerank_score = Some(score);
        }
        results.sort_by(|a, b| {
            let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
            let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
            b.total_cmp(&a)
        });
        results.truncate(top_k);

        debug!("Re-ranked to {} results", results.len());
        results
    }

    fn degrade(mut results: Vec<SearchResult>, top_k: usize, err: Error) -> Vec<SearchResult> {
        warn!("Relevance scoring failed, keeping search order: {}", err);
        metrics::record_degraded(Collaborator::RelevanceScorer);
        results.truncate(top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed scores and counts calls.
    struct FixedScorer {
        scores: Result<Vec<f32>>,
        calls: AtomicUsize,
    }

    impl FixedScorer {
        fn ok(scores: Vec<f32>) -> Self {
            Self {
                scores: Ok(scores),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                scores: Err(Error::Scoring("model not loaded".into())),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.scores {
                Ok(scores) => Ok(scores.clone()),
                Err(err) => Err(Error::Scoring(err.to_string())),
            }
        }
    }

    fn results() -> Vec<SearchResult> {
        vec![
            SearchResult::new("low vector, high relevance", 0.31, "Caste"),
            SearchResult::new("high vector, low relevance", 0.95, "Society"),
        ]
    }

    #[tokio::test]
    async fn order_follows_relevance_not_vector_score() {
        let ranker = Ranker::new(FixedScorer::ok(vec![0.9, 0.2]));

        let ranked = ranker.rerank(results(), "origin of caste", 5).await;

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "low vector, high relevance");
        assert_eq!(ranked[0].rerank_score, Some(0.9));
        assert_eq!(ranked[1].rerank_score, Some(0.2));
        assert_eq!(ranked[0].score, 0.31);
    }

    #[tokio::test]
    async fn ties_keep_input_order() {
        let ranker = Ranker::new(FixedScorer::ok(vec![0.5, 0.5, 0.7]));
        let mut input = results();
        input.push(SearchResult::new("third", 0.1, "Hindu"));

        let ranked = ranker.rerank(input, "q", 5).await;
        let texts: Vec<&str> = ranked.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["third", "low vector, high relevance", "high vector, low relevance"]
        );
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let ranker = Ranker::new(FixedScorer::ok(vec![0.1, 0.2]));
        let ranked = ranker.rerank(results(), "q", 1).await;
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].text, "high vector, low relevance");
    }

    #[tokio::test]
    async fn empty_input_skips_scorer() {
        let ranker = Ranker::new(FixedScorer::ok(vec![]));
        let ranked = ranker.rerank(Vec::new(), "q", 5).await;

        assert!(ranked.is_empty());
        assert_eq!(ranker.scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scorer_failure_keeps_input_order() {
        let ranker = Ranker::new(FixedScorer::failing());
        let ranked = ranker.rerank(results(), "q", 1).await;

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].text, "low vector, high relevance");
        assert!(ranked[0].rerank_score.is_none());
    }

    #[tokio::test]
    async fn score_count_mismatch_is_treated_as_failure() {
        let ranker = Ranker::new(FixedScorer::ok(vec![0.4]));
        let ranked = ranker.rerank(results(), "q", 5).await;

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.rerank_score.is_none()));
    }

    #[test]
    fn lexical_scorer_prefers_passages_covering_query() {
        let passages = vec![
            "The origin of caste lies in endogamy.".to_string(),
            "Weekend gardening helps people relax.".to_string(),
            "Caste is discussed here.".to_string(),
        ];
        let scores = LexicalScorer.score_passages("origin of caste", &passages);

        assert_eq!(scores.len(), 3);
        assert!(scores[0] > scores[2]);
        assert!(scores[2] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn lexical_scorer_handles_empty_query() {
        let scores = LexicalScorer.score_passages("?", &["anything".to_string()]);
        assert_eq!(scores, vec![0.0]);
    }
}
