//! Core data models used throughout the incident-context pipeline.
//!
//! These types represent the chunks, search hits, signals, and ranked results
//! that flow through indexing and retrieval.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a chunk, assigned sequentially within one indexing run.
pub type ChunkId = i64;

/// File name of the metadata artifact inside an index directory.
pub const INDEX_META_FILE: &str = "index_meta.json";

/// A contiguous line range of one repository file.
///
/// Lines are 1-based and inclusive. Chunks are created once by the chunker
/// and never mutated; a re-index with the same id replaces the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    /// Repository-relative path with `/` separators.
    pub path: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// A single nearest-neighbour match from a vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    /// Similarity, higher is closer. Monotonic in cosine similarity.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Lexical features extracted from incident text.
///
/// Ordered sets keep reranker sums reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentSignals {
    pub endpoints: BTreeSet<String>,
    pub exceptions: BTreeSet<String>,
    /// Dotted qualified names taken from `at a.b.C.method(...)` frames.
    pub frames: BTreeSet<String>,
    /// Lowercased infrastructure / performance vocabulary.
    pub keywords: BTreeSet<String>,
}

impl IncidentSignals {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
            && self.exceptions.is_empty()
            && self.frames.is_empty()
            && self.keywords.is_empty()
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// `base_score + rerank_score`.
    pub score: f64,
    /// Raw vector similarity.
    pub base_score: f64,
    /// Signal matches plus path adjustment.
    pub rerank_score: f64,
    pub chunk: Chunk,
}

/// Trace section of an incident.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentTraces {
    pub top_spans: Vec<serde_json::Value>,
}

/// Structured description of a production problem.
///
/// Every field is optional; absence is treated as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Incident {
    pub service: Option<String>,
    pub symptoms: BTreeMap<String, serde_json::Value>,
    pub logs: Vec<String>,
    pub traces: IncidentTraces,
}

impl Incident {
    /// Read an incident from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read incident file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse incident file: {}", path.display()))
    }
}

/// Descriptive record of one completed index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub repo_root: PathBuf,
    pub embed_model: String,
    pub embed_batch_size: usize,
    pub chunk_max_lines: usize,
    pub chunk_overlap: usize,
    pub dim: usize,
    pub chunks: usize,
    pub vector_backend: String,
    pub created_at: DateTime<Utc>,
}

impl IndexMetadata {
    /// Write `index_meta.json` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_META_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write index metadata: {}", path.display()))?;
        Ok(path)
    }

    /// Read `index_meta.json` from `dir`, if a build has completed there.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(INDEX_META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let meta = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse index metadata: {}", path.display()))?;
        Ok(Some(meta))
    }
}
