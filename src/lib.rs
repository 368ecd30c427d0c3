//! semrag: knowledge-graph hybrid retrieval over a fixed corpus.
//!
//! This library provides tools to:
//! - Split a corpus into semantically coherent chunks
//! - Build a chunk/entity knowledge graph and partition it into communities
//! - Summarize each community into a short theme description
//! - Answer questions from entity-anchored (local) and theme-anchored
//!   (global) retrieval, re-ranked and fused into a cited answer

pub mod config;
pub mod embeddings;
pub mod error;
pub mod integrations;
pub mod metrics;
pub mod prompts;
pub mod semrag;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use integrations::{OllamaClient, RerankClient};
pub use prompts::{Prompt, PromptSet};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
