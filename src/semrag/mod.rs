//! Knowledge-graph hybrid retrieval over a fixed corpus.
//!
//! The corpus is split into sentences and merged into semantically coherent
//! chunks. Entities extracted from each chunk form a graph with the chunks;
//! the graph is partitioned into communities and every community gets a
//! short theme summary. A query is answered from two paths:
//! - local search: query → similar entities → their chunks
//! - global search: query → similar community summaries
//!
//! Local results are re-ranked, both paths are fused into a numbered
//! evidence block, and a generator writes a cited answer.

pub mod answer;
pub mod chunker;
pub mod community;
pub mod engine;
pub mod entity_extractor;
pub mod fusion;
pub mod global_search;
pub mod graph;
pub mod local_search;
pub mod merger;
pub mod ranker;
pub mod result;
pub mod sentences;
pub mod store;
pub mod summarizer;
pub mod vector;

pub use answer::{Answer, AnswerGenerator, Generator, FALLBACK_RESPONSE};
pub use chunker::{Chunk, SemanticChunker};
pub use community::{CommunityDetector, CommunityPartition, LabelPropagation};
pub use engine::{BuildPipeline, ChatResponse, ContextItem, QueryEngine};
pub use entity_extractor::{EntityExtractor, HeuristicExtractor};
pub use fusion::{Citation, EvidenceContext, ResultFusion};
pub use global_search::GlobalSearch;
pub use graph::{GraphBuilder, GraphData, KnowledgeGraph, Node, NodeKind};
pub use local_search::LocalSearch;
pub use merger::ChunkMerger;
pub use ranker::{LexicalScorer, Ranker, RelevanceScorer, ScoreBackend};
pub use result::SearchResult;
pub use sentences::Sentence;
pub use store::{Artifact, ArtifactStore, Manifest};
pub use summarizer::CommunitySummarizer;
