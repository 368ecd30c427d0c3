//! Pipeline configuration
//!
//! Loads configuration from config.yml file. A single [`Config`] is built at
//! process start and handed to every component constructor.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_SOURCE_TEXT: &str = "data/corpus.txt";
pub const DEFAULT_PROCESSED_DIR: &str = "processed";
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;
pub const DEFAULT_MAX_TOKENS: usize = 1024;
pub const DEFAULT_MIN_SENTENCE_CHARS: usize = 20;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8080";

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Hashed bag-of-words, no network
    Local,
    /// Ollama `/api/embed`
    Ollama,
    /// OpenAI embeddings API
    OpenAi,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::Local => "local",
            EmbeddingProvider::Ollama => "ollama",
            EmbeddingProvider::OpenAi => "openai",
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" | "hash" => Ok(EmbeddingProvider::Local),
            "ollama" => Ok(EmbeddingProvider::Ollama),
            "openai" => Ok(EmbeddingProvider::OpenAi),
            other => Err(Error::Config(format!("unknown embedding provider '{}'", other))),
        }
    }
}

/// Which relevance scorer backs the re-ranking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankProvider {
    /// Term-coverage scoring, no network
    Lexical,
    /// Cross-encoder behind a `/rerank` endpoint
    Remote,
}

impl FromStr for RerankProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "lexical" | "local" => Ok(RerankProvider::Lexical),
            "remote" | "cross-encoder" | "cross_encoder" => Ok(RerankProvider::Remote),
            other => Err(Error::Config(format!("unknown rerank provider '{}'", other))),
        }
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    paths: Option<PathsYaml>,
    chunking: Option<ChunkingYaml>,
    embedding: Option<EmbeddingYaml>,
    llm: Option<LlmYaml>,
    retrieval: Option<RetrievalYaml>,
    rerank: Option<RerankYaml>,
    community: Option<CommunityYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsYaml {
    source_text: Option<String>,
    processed_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkingYaml {
    similarity_threshold: Option<f32>,
    max_tokens: Option<usize>,
    min_sentence_chars: Option<usize>,
    embedding_batch_size: Option<usize>,
    embedding_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingYaml {
    provider: Option<String>,
    model: Option<String>,
    dimension: Option<usize>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmYaml {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalYaml {
    local_top_k: Option<usize>,
    local_threshold: Option<f32>,
    max_seed_entities: Option<usize>,
    corroboration_boost: Option<f32>,
    global_top_k: Option<usize>,
    rerank_top_k: Option<usize>,
    context_local: Option<usize>,
    context_global: Option<usize>,
    summary_chunks: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RerankYaml {
    provider: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommunityYaml {
    max_iterations: Option<usize>,
}

/// Input and artifact locations.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub source_text: PathBuf,
    pub processed_dir: PathBuf,
}

/// Sentence-merging parameters.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub similarity_threshold: f32,
    pub max_tokens: usize,
    pub min_sentence_chars: usize,
    pub embedding_batch_size: usize,
    pub embedding_concurrency: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_tokens: DEFAULT_MAX_TOKENS,
            min_sentence_chars: DEFAULT_MIN_SENTENCE_CHARS,
            embedding_batch_size: 64,
            embedding_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    /// Dimension of the local hashed embedder
    pub dimension: usize,
    pub url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: 256,
            url: DEFAULT_OLLAMA_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 512,
            url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Query-time knobs for local/global search, re-ranking and fusion.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub local_top_k: usize,
    /// Entities must score strictly above this to seed local search
    pub local_threshold: f32,
    /// Fan-out cap on seed entities, independent of `local_top_k`
    pub max_seed_entities: usize,
    /// Added once per extra entity that reaches an already collected chunk.
    /// Tunable, not a law: it can outweigh a much higher single similarity.
    pub corroboration_boost: f32,
    pub global_top_k: usize,
    pub rerank_top_k: usize,
    pub context_local: usize,
    pub context_global: usize,
    /// Chunk texts fed to the summarizer per community
    pub summary_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            local_top_k: 5,
            local_threshold: 0.3,
            max_seed_entities: 10,
            corroboration_boost: 0.1,
            global_top_k: 3,
            rerank_top_k: 5,
            context_local: 3,
            context_global: 2,
            summary_chunks: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub provider: RerankProvider,
    pub url: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: RerankProvider::Lexical,
            url: DEFAULT_RERANK_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommunityConfig {
    pub max_iterations: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self { max_iterations: 20 }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub community: CommunityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Result<Self> {
        for candidate in [CONFIG_FILE, "../config.yml"] {
            if Path::new(candidate).exists() {
                return Self::load_from_file(candidate);
            }
        }

        Self::load_dotenv();
        let mut config = Self::defaults();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                return std::env::var(var_name)
                    .ok()
                    .or_else(|| std::env::var(env_key).ok());
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text (env overrides applied).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        let defaults = Self::defaults();
        let paths = yaml.paths.unwrap_or_default();
        let chunking = yaml.chunking.unwrap_or_default();
        let embedding = yaml.embedding.unwrap_or_default();
        let llm = yaml.llm.unwrap_or_default();
        let retrieval = yaml.retrieval.unwrap_or_default();
        let rerank = yaml.rerank.unwrap_or_default();
        let community = yaml.community.unwrap_or_default();

        let embedding_provider = match embedding.provider {
            Some(p) => p.parse()?,
            None => defaults.embedding.provider,
        };
        let rerank_provider = match rerank.provider {
            Some(p) => p.parse()?,
            None => defaults.rerank.provider,
        };

        let config = Self {
            paths: PathsConfig {
                source_text: paths
                    .source_text
                    .map(PathBuf::from)
                    .unwrap_or(defaults.paths.source_text),
                processed_dir: paths
                    .processed_dir
                    .map(PathBuf::from)
                    .unwrap_or(defaults.paths.processed_dir),
            },
            chunking: ChunkingConfig {
                similarity_threshold: chunking
                    .similarity_threshold
                    .unwrap_or(defaults.chunking.similarity_threshold),
                max_tokens: chunking.max_tokens.unwrap_or(defaults.chunking.max_tokens),
                min_sentence_chars: chunking
                    .min_sentence_chars
                    .unwrap_or(defaults.chunking.min_sentence_chars),
                embedding_batch_size: chunking
                    .embedding_batch_size
                    .unwrap_or(defaults.chunking.embedding_batch_size),
                embedding_concurrency: chunking
                    .embedding_concurrency
                    .unwrap_or(defaults.chunking.embedding_concurrency),
            },
            embedding: EmbeddingConfig {
                provider: embedding_provider,
                model: embedding.model.unwrap_or(defaults.embedding.model),
                dimension: embedding.dimension.unwrap_or(defaults.embedding.dimension),
                url: Self::resolve_env_string(embedding.url, "OLLAMA_URL")
                    .unwrap_or(defaults.embedding.url),
            },
            llm: LlmConfig {
                model: llm.model.unwrap_or(defaults.llm.model),
                temperature: llm.temperature.unwrap_or(defaults.llm.temperature),
                max_tokens: llm.max_tokens.unwrap_or(defaults.llm.max_tokens),
                url: Self::resolve_env_string(llm.url, "OLLAMA_URL").unwrap_or(defaults.llm.url),
                timeout_secs: llm.timeout_secs.unwrap_or(defaults.llm.timeout_secs),
            },
            retrieval: RetrievalConfig {
                local_top_k: retrieval
                    .local_top_k
                    .unwrap_or(defaults.retrieval.local_top_k),
                local_threshold: retrieval
                    .local_threshold
                    .unwrap_or(defaults.retrieval.local_threshold),
                max_seed_entities: retrieval
                    .max_seed_entities
                    .unwrap_or(defaults.retrieval.max_seed_entities),
                corroboration_boost: retrieval
                    .corroboration_boost
                    .unwrap_or(defaults.retrieval.corroboration_boost),
                global_top_k: retrieval
                    .global_top_k
                    .unwrap_or(defaults.retrieval.global_top_k),
                rerank_top_k: retrieval
                    .rerank_top_k
                    .unwrap_or(defaults.retrieval.rerank_top_k),
                context_local: retrieval
                    .context_local
                    .unwrap_or(defaults.retrieval.context_local),
                context_global: retrieval
                    .context_global
                    .unwrap_or(defaults.retrieval.context_global),
                summary_chunks: retrieval
                    .summary_chunks
                    .unwrap_or(defaults.retrieval.summary_chunks),
            },
            rerank: RerankConfig {
                provider: rerank_provider,
                url: Self::resolve_env_string(rerank.url, "RERANK_URL")
                    .unwrap_or(defaults.rerank.url),
            },
            community: CommunityConfig {
                max_iterations: community
                    .max_iterations
                    .unwrap_or(defaults.community.max_iterations),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Create config with built-in defaults (fallback)
    pub fn defaults() -> Self {
        Self {
            paths: PathsConfig {
                source_text: PathBuf::from(DEFAULT_SOURCE_TEXT),
                processed_dir: PathBuf::from(DEFAULT_PROCESSED_DIR),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            community: CommunityConfig::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.url = url.clone();
            self.embedding.url = url;
        }
        if let Ok(url) = std::env::var("RERANK_URL") {
            self.rerank.url = url;
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let threshold_ok = |t: f32| (-1.0..=1.0).contains(&t);

        if !threshold_ok(self.chunking.similarity_threshold) {
            return Err(Error::Config(format!(
                "chunking.similarity_threshold must be within [-1, 1], got {}",
                self.chunking.similarity_threshold
            )));
        }
        if !threshold_ok(self.retrieval.local_threshold) {
            return Err(Error::Config(format!(
                "retrieval.local_threshold must be within [-1, 1], got {}",
                self.retrieval.local_threshold
            )));
        }
        if self.chunking.max_tokens == 0 {
            return Err(Error::Config("chunking.max_tokens must be positive".into()));
        }
        if self.chunking.embedding_batch_size == 0 || self.chunking.embedding_concurrency == 0 {
            return Err(Error::Config(
                "chunking.embedding_batch_size and embedding_concurrency must be positive".into(),
            ));
        }
        let boost = self.retrieval.corroboration_boost;
        if !(boost.is_finite() && boost > 0.0) {
            return Err(Error::Config(format!(
                "retrieval.corroboration_boost must be a positive number, got {}",
                boost
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.chunking.similarity_threshold, 0.6);
        assert_eq!(config.chunking.max_tokens, 1024);
        assert_eq!(config.retrieval.local_top_k, 5);
        assert_eq!(config.retrieval.local_threshold, 0.3);
        assert_eq!(config.retrieval.max_seed_entities, 10);
        assert!((config.retrieval.corroboration_boost - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.context_local, 3);
        assert_eq!(config.retrieval.context_global, 2);
        assert_eq!(config.paths.processed_dir, PathBuf::from("processed"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
paths:
  source_text: "books/annihilation.txt"
  processed_dir: "out"

chunking:
  similarity_threshold: 0.5
  max_tokens: 256

embedding:
  provider: ollama
  model: "mxbai-embed-large"

retrieval:
  local_top_k: 7
  corroboration_boost: 0.05

rerank:
  provider: remote
"#;
        let config = Config::from_yaml_str(yaml).unwrap();

        assert_eq!(config.paths.source_text, PathBuf::from("books/annihilation.txt"));
        assert_eq!(config.paths.processed_dir, PathBuf::from("out"));
        assert_eq!(config.chunking.similarity_threshold, 0.5);
        assert_eq!(config.chunking.max_tokens, 256);
        assert_eq!(config.chunking.min_sentence_chars, DEFAULT_MIN_SENTENCE_CHARS);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.retrieval.local_top_k, 7);
        assert_eq!(config.retrieval.global_top_k, 3);
        assert_eq!(config.rerank.provider, RerankProvider::Remote);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Local);
        assert_eq!(config.community.max_iterations, 20);
    }

    #[test]
    fn rejects_unknown_provider() {
        let yaml = "embedding:\n  provider: word2vec\n";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let yaml = "chunking:\n  similarity_threshold: 1.5\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_non_positive_corroboration_boost() {
        for boost in ["-0.5", "0.0", ".nan"] {
            let yaml = format!("retrieval:\n  corroboration_boost: {boost}\n");
            assert!(
                matches!(Config::from_yaml_str(&yaml), Err(Error::Config(_))),
                "boost {boost} accepted"
            );
        }
        assert!(Config::from_yaml_str("retrieval:\n  corroboration_boost: 0.25\n").is_ok());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let yaml = "chunking:\n  max_tokens: 0\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn provider_aliases_parse() {
        assert_eq!("LOCAL".parse::<EmbeddingProvider>().unwrap(), EmbeddingProvider::Local);
        assert_eq!("openai".parse::<EmbeddingProvider>().unwrap(), EmbeddingProvider::OpenAi);
        assert_eq!(
            "cross-encoder".parse::<RerankProvider>().unwrap(),
            RerankProvider::Remote
        );
        assert_eq!("lexical".parse::<RerankProvider>().unwrap(), RerankProvider::Lexical);
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "{ invalid yaml [").unwrap();

        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn load_from_file_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "community:\n  max_iterations: 5\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.community.max_iterations, 5);
    }
}
