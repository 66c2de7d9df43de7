//! Pluggable nearest-neighbour search over chunk embeddings.
//!
//! The [`VectorIndex`] trait is the only surface the indexing and retrieval
//! pipelines see. Which backend sits behind it is decided by
//! `[vector].backend` in the configuration, see [`open_vector_index`].
//!
//! | Backend | Module | Storage |
//! |---------|--------|---------|
//! | `flat` | [`flat`] | Exact inner product over normalized vectors, persisted in the index directory |
//! | `qdrant` | [`qdrant`] | External Qdrant collection with cosine distance |
//!
//! Both backends rank by cosine similarity and reject vectors whose length
//! differs from the collection dimensionality.

pub mod flat;
pub mod qdrant;

use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::VectorConfig;
use crate::error::VectorError;
use crate::models::{ChunkId, VectorHit};

pub use flat::FlatIndex;
pub use qdrant::QdrantIndex;

/// Added to the norm before dividing, so near-zero vectors stay finite.
pub const NORM_EPSILON: f32 = 1e-12;

/// Similarity index keyed by chunk id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend identifier (`"flat"`, `"qdrant"`), recorded in index metadata.
    fn backend_name(&self) -> &str;

    /// Create the collection for `dim`-sized vectors if it does not exist.
    /// An existing collection is left untouched.
    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorError>;

    /// Insert or overwrite vectors (and optional payloads) by id.
    ///
    /// Every vector must have the collection dimensionality; on mismatch
    /// nothing is written. A duplicated id within one batch resolves to the
    /// last occurrence.
    async fn upsert(
        &self,
        ids: &[ChunkId],
        vectors: &[Vec<f32>],
        payloads: Option<&[serde_json::Value]>,
    ) -> Result<(), VectorError>;

    /// At most `top_k` hits ordered by descending similarity.
    /// An index that has not been built yet returns no hits.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>, VectorError>;

    /// Dimensionality of the collection, if one exists.
    async fn dim(&self) -> Result<Option<usize>, VectorError>;

    /// Persist pending state. Backends that write through may ignore this.
    async fn flush(&self) -> Result<(), VectorError> {
        Ok(())
    }
}

/// Scale `v` to unit length: `v / (‖v‖ + ε)`.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    v.iter().map(|x| x / norm).collect()
}

/// Validate the shape of an upsert before anything is written.
pub fn check_upsert(
    dim: usize,
    ids: &[ChunkId],
    vectors: &[Vec<f32>],
    payloads: Option<&[serde_json::Value]>,
) -> Result<(), VectorError> {
    let payload_len = payloads.map_or(ids.len(), <[serde_json::Value]>::len);
    if ids.len() != vectors.len() || payload_len != ids.len() {
        return Err(VectorError::LengthMismatch {
            ids: ids.len(),
            vectors: vectors.len(),
            payloads: payload_len,
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(VectorError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Backend for an index build. The flat backend starts empty so a rebuild
/// replaces the previous artifacts instead of adding to them.
pub fn create_vector_index(config: &VectorConfig, index_dir: &Path) -> Result<Box<dyn VectorIndex>> {
    match config.backend.as_str() {
        "flat" => Ok(Box::new(FlatIndex::create(index_dir))),
        _ => open_vector_index(config, index_dir),
    }
}

/// Open the backend selected by `[vector].backend`.
///
/// The flat backend lives in `index_dir`; Qdrant is reached at `[vector].url`.
pub fn open_vector_index(config: &VectorConfig, index_dir: &Path) -> Result<Box<dyn VectorIndex>> {
    match config.backend.as_str() {
        "flat" => Ok(Box::new(FlatIndex::open(index_dir)?)),
        "qdrant" => Ok(Box::new(QdrantIndex::new(&config.url, &config.collection)?)),
        other => bail!(
            "Unknown vector backend: '{}'. Must be flat or qdrant.",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let n = normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_finite() {
        let n = normalize(&[0.0, 0.0, 0.0]);
        assert!(n.iter().all(|x| x.is_finite() && *x == 0.0));
    }

    #[test]
    fn test_check_upsert_rejects_wrong_dimension() {
        let err = check_upsert(3, &[1, 2], &[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]], None)
            .unwrap_err();
        assert!(matches!(
            err,
            VectorError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_check_upsert_rejects_length_mismatch() {
        let payloads = vec![serde_json::json!({})];
        assert!(matches!(
            check_upsert(2, &[1, 2], &[vec![1.0, 0.0], vec![0.0, 1.0]], Some(&payloads)),
            Err(VectorError::LengthMismatch { .. })
        ));
        assert!(matches!(
            check_upsert(2, &[1], &[], None),
            Err(VectorError::LengthMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_build_backend_starts_empty_open_backend_loads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = VectorConfig::default();

        let first = create_vector_index(&config, tmp.path()).unwrap();
        first.ensure_collection(2).await.unwrap();
        first.upsert(&[1, 2], &[vec![1.0, 0.0], vec![0.0, 1.0]], None).await.unwrap();
        first.flush().await.unwrap();

        let opened = open_vector_index(&config, tmp.path()).unwrap();
        assert_eq!(opened.search(&[1.0, 0.0], 5).await.unwrap().len(), 2);

        let rebuilt = create_vector_index(&config, tmp.path()).unwrap();
        assert_eq!(rebuilt.dim().await.unwrap(), None);
        assert!(rebuilt.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }
}
