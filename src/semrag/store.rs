//! Persisted artifacts shared between the build and serving phases.
//!
//! Everything lives in one directory (`paths.processed_dir`). Each file is
//! written to `<name>.tmp` first and renamed into place, so a reader never
//! sees a half-written artifact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use super::chunker::Chunk;
use super::community::CommunityPartition;
use super::graph::KnowledgeGraph;
use crate::config::PathsConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Chunks,
    Graph,
    Communities,
    Summaries,
    Manifest,
}

impl Artifact {
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Chunks => "chunks.json",
            Artifact::Graph => "knowledge_graph.json",
            Artifact::Communities => "communities.json",
            Artifact::Summaries => "community_summaries.json",
            Artifact::Manifest => "manifest.json",
        }
    }

    /// Small artifacts are pretty-printed; chunks and the graph are not.
    fn pretty(&self) -> bool {
        matches!(
            self,
            Artifact::Communities | Artifact::Summaries | Artifact::Manifest
        )
    }
}

/// Build metadata written after a full build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub built_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub community_count: usize,
    pub summary_count: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.processed_dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).exists()
    }

    async fn write_json<T: Serialize + ?Sized>(&self, artifact: Artifact, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path(artifact);
        let tmp = path.with_extension("json.tmp");
        let content = if artifact.pretty() {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        fs::write(&tmp, &content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), bytes = content.len(), "Artifact written");
        Ok(path)
    }

    async fn read_json<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<T> {
        let path = self.path(artifact);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact(format!(
                    "{} not found, run the build first",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&content).map_err(|e| {
            Error::SerializationError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    pub async fn save_chunks(&self, chunks: &[Chunk]) -> Result<PathBuf> {
        let path = self.write_json(Artifact::Chunks, chunks).await?;
        info!(count = chunks.len(), path = %path.display(), "Saved chunks");
        Ok(path)
    }

    pub async fn load_chunks(&self) -> Result<Vec<Chunk>> {
        self.read_json(Artifact::Chunks).await
    }

    pub async fn save_graph(&self, graph: &KnowledgeGraph) -> Result<PathBuf> {
        let path = self.write_json(Artifact::Graph, graph).await?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            path = %path.display(),
            "Saved knowledge graph"
        );
        Ok(path)
    }

    pub async fn load_graph(&self) -> Result<KnowledgeGraph> {
        self.read_json(Artifact::Graph).await
    }

    pub async fn save_communities(&self, communities: &CommunityPartition) -> Result<PathBuf> {
        let path = self.write_json(Artifact::Communities, communities).await?;
        info!(count = communities.len(), path = %path.display(), "Saved communities");
        Ok(path)
    }

    pub async fn load_communities(&self) -> Result<CommunityPartition> {
        self.read_json(Artifact::Communities).await
    }

    pub async fn save_summaries(&self, summaries: &BTreeMap<usize, String>) -> Result<PathBuf> {
        let path = self.write_json(Artifact::Summaries, summaries).await?;
        info!(count = summaries.len(), path = %path.display(), "Saved community summaries");
        Ok(path)
    }

    pub async fn load_summaries(&self) -> Result<BTreeMap<usize, String>> {
        self.read_json(Artifact::Summaries).await
    }

    pub async fn save_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        self.write_json(Artifact::Manifest, manifest).await
    }

    pub async fn load_manifest(&self) -> Result<Manifest> {
        self.read_json(Artifact::Manifest).await
    }
}
