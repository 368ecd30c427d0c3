use serde::{Deserialize, Serialize};

use super::merger::ChunkMerger;
use super::sentences::Sentence;
use super::vector::mean_embedding;
use crate::{Error, Result};

/// Prefix of the graph key derived from a chunk id.
pub const CHUNK_KEY_PREFIX: &str = "CHUNK_";

/// Merged, semantically coherent passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential id, 0-based, in corpus order
    pub id: usize,
    /// Constituent sentences joined with single spaces
    pub text: String,
    /// Sum of the sentences' whitespace token counts
    pub token_count: usize,
    /// Mean of the sentence embeddings
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Stable graph key for this chunk.
    pub fn key(&self) -> String {
        chunk_key(self.id)
    }
}

pub fn chunk_key(id: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{id}")
}

/// Parse a graph key back into a chunk id.
pub fn parse_chunk_key(key: &str) -> Option<usize> {
    key.strip_prefix(CHUNK_KEY_PREFIX)?.parse().ok()
}

#[derive(Debug, Default)]
struct ChunkBuffer {
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    tokens: usize,
}

impl ChunkBuffer {
    fn push(&mut self, text: &str, embedding: &[f32], tokens: usize) {
        self.texts.push(text.to_string());
        self.embeddings.push(embedding.to_vec());
        self.tokens += tokens;
    }

    fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Turn the buffer into a chunk and leave it empty.
    fn seal(&mut self, id: usize) -> Chunk {
        let chunk = Chunk {
            id,
            text: self.texts.join(" "),
            token_count: self.tokens,
            embedding: mean_embedding(&self.embeddings),
        };
        *self = Self::default();
        chunk
    }
}

/// Groups consecutive sentences into chunks using [`ChunkMerger`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticChunker {
    merger: ChunkMerger,
}

impl SemanticChunker {
    pub fn new(merger: ChunkMerger) -> Self {
        Self { merger }
    }

    /// Merge `sentences` (with their embeddings, same order) into chunks.
    pub fn chunk(&self, sentences: &[Sentence], embeddings: &[Vec<f32>]) -> Result<Vec<Chunk>> {
        if sentences.len() != embeddings.len() {
            return Err(Error::InvalidArgument(format!(
                "{} sentences but {} embeddings",
                sentences.len(),
                embeddings.len()
            )));
        }

        let mut chunks = Vec::new();
        let mut buffer = ChunkBuffer::default();

        for (sentence, embedding) in sentences.iter().zip(embeddings) {
            let tokens = sentence.token_count();

            let merge = self
                .merger
                .decide(&buffer.embeddings, embedding, buffer.tokens, tokens);

            // A refused sentence on an empty buffer (it alone hits the cap)
            // still seeds a chunk of its own.
            if !merge && !buffer.is_empty() {
                chunks.push(buffer.seal(chunks.len()));
            }
            buffer.push(&sentence.text, embedding, tokens);
        }

        if !buffer.is_empty() {
            chunks.push(buffer.seal(chunks.len()));
        }

        Ok(chunks)
    }
}
