//! Buffer-merge decision for semantic chunking.

use super::vector::{cosine_similarity, mean_embedding};
use crate::config::ChunkingConfig;

/// Float slack for parallel vectors, whose cosine may round to just under 1.0.
const PARALLEL_TOLERANCE: f32 = 1e-6;

/// Decides whether the next sentence extends the current passage buffer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkMerger {
    threshold: f32,
    max_tokens: usize,
}

impl Default for ChunkMerger {
    fn default() -> Self {
        Self::new(0.6, 1024)
    }
}

impl ChunkMerger {
    pub fn new(threshold: f32, max_tokens: usize) -> Self {
        Self {
            threshold,
            max_tokens,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.similarity_threshold, config.max_tokens)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Accept or refuse `candidate` for the buffer.
    ///
    /// The token cap is checked first and wins over similarity. An empty
    /// buffer accepts anything under the cap; otherwise the candidate must be
    /// at least `threshold` similar to the mean of the buffer.
    pub fn decide<V: AsRef<[f32]>>(
        &self,
        buffer_embeddings: &[V],
        candidate: &[f32],
        current_tokens: usize,
        candidate_tokens: usize,
    ) -> bool {
        if current_tokens.saturating_add(candidate_tokens) >= self.max_tokens {
            return false;
        }

        if buffer_embeddings.is_empty() {
            return true;
        }

        let centroid = mean_embedding(buffer_embeddings);
        let similarity = cosine_similarity(&centroid, candidate);

        if similarity >= self.threshold {
            return true;
        }
        // Only a candidate parallel to the centroid gets the slack.
        similarity >= 1.0 - PARALLEL_TOLERANCE && self.threshold <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_embeddings_merge() {
        let merger = ChunkMerger::new(0.5, 1024);
        let buffer = vec![vec![1.0, 0.0, 0.0]];

        assert!(merger.decide(&buffer, &[1.0, 0.0, 0.0], 10, 10));
    }

    #[test]
    fn identical_embeddings_merge_at_threshold_one() {
        let merger = ChunkMerger::new(1.0, 1024);
        let v = vec![0.3, 0.7, 0.1, 0.9];
        let buffer = vec![v.clone(), v.clone(), v.clone()];

        assert!(merger.decide(&buffer, &v, 3, 3));
    }

    #[test]
    fn just_below_threshold_is_refused() {
        let buffer = vec![vec![1.0, 0.0]];
        let candidate = [0.6, 0.8];
        let similarity = cosine_similarity(&buffer[0], &candidate);

        assert!(ChunkMerger::new(similarity, 1024).decide(&buffer, &candidate, 1, 1));
        assert!(!ChunkMerger::new(similarity + 5e-7, 1024).decide(&buffer, &candidate, 1, 1));
    }

    #[test]
    fn token_cap_wins_over_similarity() {
        let merger = ChunkMerger::new(0.0, 100);
        let buffer = vec![vec![1.0, 0.0]];

        assert!(!merger.decide(&buffer, &[1.0, 0.0], 60, 40));
        assert!(!merger.decide(&buffer, &[1.0, 0.0], 99, 5));
        assert!(merger.decide(&buffer, &[1.0, 0.0], 59, 40));
    }

    #[test]
    fn token_cap_applies_to_empty_buffer() {
        let merger = ChunkMerger::new(0.6, 10);
        let empty: Vec<Vec<f32>> = Vec::new();

        assert!(!merger.decide(&empty, &[1.0], 0, 10));
    }

    #[test]
    fn empty_buffer_accepts_any_candidate() {
        let merger = ChunkMerger::new(0.99, 1024);
        let empty: Vec<Vec<f32>> = Vec::new();

        assert!(merger.decide(&empty, &[0.0, 1.0], 0, 12));
        assert!(merger.decide(&empty, &[], 0, 12));
    }

    #[test]
    fn dissimilar_candidate_is_refused() {
        let merger = ChunkMerger::new(0.6, 1024);
        let buffer = vec![vec![1.0, 0.0]];

        assert!(!merger.decide(&buffer, &[0.0, 1.0], 10, 10));
    }

    #[test]
    fn compares_against_buffer_mean() {
        let merger = ChunkMerger::new(0.9, 1024);
        // Mean of the buffer points along (1, 1); candidate matches the mean,
        // not either member individually.
        let buffer = vec![vec![1.0, 0.0], vec![0.0, 1.0]];

        assert!(merger.decide(&buffer, &[1.0, 1.0], 4, 4));
        assert!(!merger.decide(&buffer, &[1.0, 0.0], 4, 4));
    }

    #[test]
    fn cap_property_holds_for_many_counts() {
        let merger = ChunkMerger::new(-1.0, 50);
        let buffer = vec![vec![1.0]];
        for a in 0..60usize {
            for b in 0..60usize {
                if a + b >= 50 {
                    assert!(!merger.decide(&buffer, &[1.0], a, b), "a={a} b={b}");
                }
            }
        }
    }

    #[test]
    fn from_config_copies_limits() {
        let config = ChunkingConfig {
            similarity_threshold: 0.42,
            max_tokens: 77,
            ..Default::default()
        };
        let merger = ChunkMerger::from_config(&config);
        assert_eq!(merger.threshold(), 0.42);
        assert_eq!(merger.max_tokens(), 77);
    }
}
