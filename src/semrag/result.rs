use serde::{Deserialize, Serialize};

/// One retrieved passage or community summary. Produced per query, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    /// Vector-similarity score from the search stage
    pub score: f32,
    /// Entity name (local) or "Community <id> Summary" (global)
    pub provenance: String,
    /// Pairwise relevance score attached by the ranker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl SearchResult {
    pub fn new(text: impl Into<String>, score: f32, provenance: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score,
            provenance: provenance.into(),
            rerank_score: None,
        }
    }
}
