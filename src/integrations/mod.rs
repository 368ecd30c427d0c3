//! External integrations module.
//!
//! Provides clients for:
//! - Ollama (local LLM generation and embeddings)
//! - Cross-encoder rerank service (`/rerank`)

pub mod ollama;
pub mod rerank;

pub use ollama::{OllamaClient, OllamaEmbedder, OllamaGenerator};
pub use rerank::RerankClient;
