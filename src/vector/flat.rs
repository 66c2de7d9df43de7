//! In-process exact vector index.
//!
//! Vectors are normalized on write and stored row-major in one `Vec<f32>`;
//! search is a brute-force inner product against every row, so the score is
//! the cosine similarity. Upserting an existing id overwrites its row in place.
//!
//! When opened on a directory the index persists to two files there:
//! `flat_index.json` (dimensionality, row ids, payloads) and `flat_index.f32`
//! (little-endian vector data). A directory without them opens as an empty,
//! not-yet-built index. [`FlatIndex::create`] ignores whatever is already in
//! the directory; the next `flush` replaces it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::VectorError;
use crate::models::{ChunkId, VectorHit};

use super::{check_upsert, normalize, VectorIndex};

const HEADER_FILE: &str = "flat_index.json";
const VECTORS_FILE: &str = "flat_index.f32";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlatHeader {
    dim: Option<usize>,
    ids: Vec<ChunkId>,
    payloads: Vec<Option<serde_json::Value>>,
}

#[derive(Debug, Default)]
struct FlatState {
    dim: Option<usize>,
    ids: Vec<ChunkId>,
    payloads: Vec<Option<serde_json::Value>>,
    /// `ids.len() * dim` normalized components.
    data: Vec<f32>,
    rows: HashMap<ChunkId, usize>,
}

impl FlatState {
    fn row(&self, i: usize, dim: usize) -> &[f32] {
        &self.data[i * dim..(i + 1) * dim]
    }
}

/// Exact flat index over normalized vectors.
#[derive(Debug, Default)]
pub struct FlatIndex {
    dir: Option<PathBuf>,
    state: RwLock<FlatState>,
}

fn poisoned<T>(_: T) -> VectorError {
    VectorError::Backend("flat index lock poisoned".to_string())
}

impl FlatIndex {
    /// A purely in-memory index; `flush` is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty index that persists to `dir`, regardless of any artifacts
    /// already there. Used by index builds so a rebuild starts fresh.
    pub fn create(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
            state: RwLock::new(FlatState::default()),
        }
    }

    /// Load the index persisted in `dir`, or start empty if there is none yet.
    pub fn open(dir: &Path) -> Result<Self, VectorError> {
        let header_path = dir.join(HEADER_FILE);
        if !header_path.exists() {
            return Ok(Self::create(dir));
        }

        let header: FlatHeader = serde_json::from_str(&std::fs::read_to_string(&header_path)?)?;
        let data = blob_to_vec(&std::fs::read(dir.join(VECTORS_FILE))?);

        let dim = header.dim.unwrap_or(0);
        if data.len() != header.ids.len() * dim || header.payloads.len() != header.ids.len() {
            return Err(VectorError::Backend(format!(
                "corrupt flat index in {}: {} ids, {} components, dim {}",
                dir.display(),
                header.ids.len(),
                data.len(),
                dim
            )));
        }

        let rows = header
            .ids
            .iter()
            .enumerate()
            .map(|(row, id)| (*id, row))
            .collect();

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            state: RwLock::new(FlatState {
                dim: header.dim,
                ids: header.ids,
                payloads: header.payloads,
                data,
                rows,
            }),
        })
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save(&self, dir: &Path) -> Result<(), VectorError> {
        let state = self.state.read().map_err(poisoned)?;
        std::fs::create_dir_all(dir)?;

        let header = FlatHeader {
            dim: state.dim,
            ids: state.ids.clone(),
            payloads: state.payloads.clone(),
        };
        // write both files aside, then swap them in
        let vectors_tmp = dir.join(format!("{}.tmp", VECTORS_FILE));
        let header_tmp = dir.join(format!("{}.tmp", HEADER_FILE));
        std::fs::write(&vectors_tmp, vec_to_blob(&state.data))?;
        std::fs::write(&header_tmp, serde_json::to_vec(&header)?)?;
        std::fs::rename(&vectors_tmp, dir.join(VECTORS_FILE))?;
        std::fs::rename(&header_tmp, dir.join(HEADER_FILE))?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn backend_name(&self) -> &str {
        "flat"
    }

    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorError> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.dim.is_none() {
            state.dim = Some(dim);
        }
        Ok(())
    }

    async fn upsert(
        &self,
        ids: &[ChunkId],
        vectors: &[Vec<f32>],
        payloads: Option<&[serde_json::Value]>,
    ) -> Result<(), VectorError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let dim = state.dim.ok_or(VectorError::NoCollection)?;
        check_upsert(dim, ids, vectors, payloads)?;

        for (i, (id, vector)) in ids.iter().zip(vectors).enumerate() {
            let unit = normalize(vector);
            let payload = payloads.map(|p| p[i].clone());
            match state.rows.get(id).copied() {
                Some(row) => {
                    state.data[row * dim..(row + 1) * dim].copy_from_slice(&unit);
                    state.payloads[row] = payload;
                }
                None => {
                    let row = state.ids.len();
                    state.ids.push(*id);
                    state.payloads.push(payload);
                    state.data.extend_from_slice(&unit);
                    state.rows.insert(*id, row);
                }
            }
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>, VectorError> {
        let state = self.state.read().map_err(poisoned)?;
        let Some(dim) = state.dim else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(VectorError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if top_k == 0 || state.ids.is_empty() {
            return Ok(Vec::new());
        }

        let q = normalize(query);
        let mut scored: Vec<(usize, f32)> = (0..state.ids.len())
            .map(|row| {
                let score = state
                    .row(row, dim)
                    .iter()
                    .zip(&q)
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                (row, score)
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| VectorHit {
                chunk_id: state.ids[row],
                score,
                payload: state.payloads[row].clone(),
            })
            .collect())
    }

    async fn dim(&self) -> Result<Option<usize>, VectorError> {
        Ok(self.state.read().map_err(poisoned)?.dim)
    }

    async fn flush(&self) -> Result<(), VectorError> {
        match &self.dir {
            Some(dir) => self.save(dir),
            None => Ok(()),
        }
    }
}
