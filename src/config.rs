//! TOML configuration parsing and validation.
//!
//! The whole configuration is read once at startup into a [`Config`] value and
//! passed down explicitly. Every section and field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//! include_prefixes = ["src/", "helm/"]
//!
//! [chunking]
//! max_lines = 80
//! overlap = 15
//!
//! [embedding]
//! provider = "local"
//! model = "bge-small-en-v1.5"
//!
//! [vector]
//! backend = "flat"
//!
//! [retrieval]
//! top_k = 12
//! prefetch_k = 80
//! max_per_file = 2
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkParams;
use crate::retrieve::RetrievalParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding `payload.sqlite`, the flat index, and `index_meta.json`.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Chunks per embed + upsert round.
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    /// Only files whose relative path starts with one of these are indexed.
    /// An empty list admits every path.
    #[serde(default = "default_include_prefixes")]
    pub include_prefixes: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            batch_size: default_index_batch_size(),
            include_prefixes: default_include_prefixes(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_index_batch_size() -> usize {
    64
}
fn default_include_prefixes() -> Vec<String> {
    [
        "src/main/java/",
        "src/main/resources/",
        "src/",
        "helm/",
        "charts/",
        "k8s/",
        "deploy/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(self.max_lines, self.overlap)?)
    }
}

fn default_max_lines() -> usize {
    80
}
fn default_overlap() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Texts per embedding call; halved on resource exhaustion.
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Prepended to the query text before embedding (e.g. `"query: "`).
    #[serde(default)]
    pub query_prefix: Option<String>,
    /// Prepended to chunk text before embedding (e.g. `"passage: "`).
    #[serde(default)]
    pub passage_prefix: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            query_prefix: None,
            passage_prefix: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    8
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `"flat"` (in-process exact search) or `"qdrant"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_backend() -> String {
    "flat".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "repo_chunks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_prefetch_k")]
    pub prefetch_k: usize,
    #[serde(default = "default_max_per_file")]
    pub max_per_file: usize,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    #[serde(default = "default_max_spans")]
    pub max_spans: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            prefetch_k: default_prefetch_k(),
            max_per_file: default_max_per_file(),
            max_log_lines: default_max_log_lines(),
            max_spans: default_max_spans(),
        }
    }
}

fn default_top_k() -> usize {
    12
}
fn default_prefetch_k() -> usize {
    80
}
fn default_max_per_file() -> usize {
    2
}
fn default_max_log_lines() -> usize {
    40
}
fn default_max_spans() -> usize {
    30
}

impl Config {
    /// Retrieval parameters derived from `[retrieval]` and the query prefix.
    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.retrieval.top_k,
            prefetch_k: self.retrieval.prefetch_k,
            max_per_file: self.retrieval.max_per_file,
            max_log_lines: self.retrieval.max_log_lines,
            max_spans: self.retrieval.max_spans,
            query_prefix: self.embedding.query_prefix.clone().unwrap_or_default(),
        }
    }

    /// Check every cross-field constraint. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        self.chunking.params()?;

        if self.index.batch_size == 0 {
            anyhow::bail!("index.batch_size must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.prefetch_k < self.retrieval.top_k {
            anyhow::bail!(
                "retrieval.prefetch_k ({}) must be >= retrieval.top_k ({})",
                self.retrieval.prefetch_k,
                self.retrieval.top_k
            );
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    anyhow::bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        match self.vector.backend.as_str() {
            "flat" | "qdrant" => {}
            other => anyhow::bail!(
                "Unknown vector backend: '{}'. Must be flat or qdrant.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
