//! Text embedding backends.
//!
//! Every backend implements [`Embedder`]; [`EmbedBackend`] picks one from
//! configuration. [`embed_all`] is the batched, bounded-concurrency entry
//! point used when caching embeddings for a whole corpus.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::integrations::ollama::{OllamaClient, OllamaEmbedder};
use crate::semrag::vector::normalize;
use crate::{Error, Result};

/// Text → fixed-dimension vector.
pub trait Embedder: Send + Sync {
    /// Embed many texts; output order matches input order 1:1.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Embed a single text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send {
        async move {
            self.embed_batch(&[text.to_string()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Embedding("no embedding returned".into()))
        }
    }
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        (**self).embed_batch(texts)
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        (**self).embed_batch(texts)
    }
}

/// Embed `texts` in batches of `batch_size`, running up to `concurrency`
/// batches at once.
///
/// Returns only after every batch has finished, in input order; a single
/// failed batch fails the whole call so no partial result escapes.
pub async fn embed_all<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size.max(1)))
        .map(|batch| async move {
            let vectors = embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "backend returned {} embeddings for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            Ok(vectors)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let embeddings: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    debug!(count = embeddings.len(), "Embedded texts");
    Ok(embeddings)
}

/// Deterministic, fast embedding for offline/local use.
///
/// Hashed bag of lowercase words, unit-normalised. Texts sharing words get
/// positive cosine similarity; it knows nothing about meaning.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dim;
            vec[idx] += 1.0;
        }

        normalize(&mut vec);
        vec
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

impl Embedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// OpenAI embeddings API.
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl EmbeddingService {
    /// Create a service using `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".into()))?;

        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the embedding dimension for the current model
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }
}

impl Embedder for EmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Blank inputs are rejected by the API; they map to empty vectors.
        let processed: Vec<String> = texts
            .iter()
            .map(|t| t.trim().chars().take(8000).collect::<String>())
            .filter(|t| !t.is_empty())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()
            .map_err(|e| Error::Embedding(format!("invalid embedding request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::Embedding(format!("OpenAI embeddings failed: {}", e)))?;

        info!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let mut embed_iter = data.into_iter();

        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Ok(Vec::new())
                } else {
                    embed_iter
                        .next()
                        .map(|e| e.embedding)
                        .ok_or_else(|| Error::Embedding("OpenAI returned too few embeddings".into()))
                }
            })
            .collect()
    }
}

/// Embedding backend selected from configuration.
#[allow(clippy::large_enum_variant)]
pub enum EmbedBackend {
    Local(LocalEmbedder),
    Ollama(OllamaEmbedder),
    OpenAI(EmbeddingService),
}

impl EmbedBackend {
    pub fn from_config(config: &EmbeddingConfig, timeout_secs: u64) -> Result<Self> {
        let backend = match config.provider {
            EmbeddingProvider::Local => EmbedBackend::Local(LocalEmbedder::new(config.dimension)),
            EmbeddingProvider::Ollama => {
                let client = OllamaClient::new(&config.url, timeout_secs)?;
                EmbedBackend::Ollama(OllamaEmbedder::new(client, config.model.clone()))
            }
            EmbeddingProvider::OpenAi => EmbedBackend::OpenAI(EmbeddingService::new(config.model.clone())?),
        };
        info!(backend = backend.name(), "Embedding backend ready");
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmbedBackend::Local(_) => "local",
            EmbedBackend::Ollama(_) => "ollama",
            EmbedBackend::OpenAI(_) => "openai",
        }
    }
}

impl Embedder for EmbedBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbedBackend::Local(local) => local.embed_batch(texts).await,
            EmbedBackend::Ollama(ollama) => ollama.embed_batch(texts).await,
            EmbedBackend::OpenAI(service) => service.embed_batch(texts).await,
        }
    }
}
