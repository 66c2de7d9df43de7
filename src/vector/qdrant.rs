//! Qdrant-backed [`VectorIndex`].
//!
//! One collection per index, cosine distance. Chunk ids map directly onto
//! numeric point ids; the chunk's location travels along as point payload.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_config, CreateCollectionBuilder, Distance,
    GetCollectionInfoRequest, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};

use crate::error::VectorError;
use crate::models::{ChunkId, VectorHit};

use super::{check_upsert, VectorIndex};

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dim: RwLock<Option<usize>>,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn backend(e: QdrantError) -> VectorError {
    VectorError::Backend(e.to_string())
}

fn poisoned<T>(_: T) -> VectorError {
    VectorError::Backend("qdrant dimension cache lock poisoned".to_string())
}

fn point_id(id: ChunkId) -> Result<u64, VectorError> {
    u64::try_from(id).map_err(|_| VectorError::Backend(format!("negative chunk id {id}")))
}

/// Convert a Qdrant payload value back into JSON.
fn value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => payload_to_json(s.fields),
    }
}

fn payload_to_json(fields: HashMap<String, qdrant_client::qdrant::Value>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect(),
    )
}

impl QdrantIndex {
    /// Build a client for `url`. No request is made until first use.
    pub fn new(url: &str, collection: &str) -> Result<Self, VectorError> {
        let client = Qdrant::from_url(url).build().map_err(backend)?;
        Ok(Self {
            client,
            collection: collection.to_string(),
            dim: RwLock::new(None),
        })
    }

    /// Dimensionality of the existing collection, cached after the first lookup.
    async fn known_dim(&self) -> Result<Option<usize>, VectorError> {
        if let Some(dim) = *self.dim.read().map_err(poisoned)? {
            return Ok(Some(dim));
        }
        if !self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(backend)?
        {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(GetCollectionInfoRequest {
                collection_name: self.collection.clone(),
            })
            .await
            .map_err(backend)?;

        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.size),
                vectors_config::Config::ParamsMap(_) => None,
            });

        let Some(size) = size else {
            return Err(VectorError::Backend(format!(
                "collection '{}' has no single unnamed vector config",
                self.collection
            )));
        };
        let dim = usize::try_from(size)
            .map_err(|_| VectorError::Backend(format!("vector size {size} out of range")))?;
        *self.dim.write().map_err(poisoned)? = Some(dim);
        Ok(Some(dim))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend_name(&self) -> &str {
        "qdrant"
    }

    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorError> {
        if self.known_dim().await?.is_some() {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(backend)?;
        tracing::info!(collection = %self.collection, dim, "created qdrant collection");

        *self.dim.write().map_err(poisoned)? = Some(dim);
        Ok(())
    }

    async fn upsert(
        &self,
        ids: &[ChunkId],
        vectors: &[Vec<f32>],
        payloads: Option<&[serde_json::Value]>,
    ) -> Result<(), VectorError> {
        let dim = self.known_dim().await?.ok_or(VectorError::NoCollection)?;
        check_upsert(dim, ids, vectors, payloads)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(ids.len());
        for (i, (id, vector)) in ids.iter().zip(vectors).enumerate() {
            let payload: HashMap<String, qdrant_client::qdrant::Value> = match payloads {
                Some(p) => serde_json::from_value(p[i].clone())?,
                None => HashMap::new(),
            };
            points.push(PointStruct::new(point_id(*id)?, vector.clone(), payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>, VectorError> {
        let Some(dim) = self.known_dim().await? else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(VectorError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(backend)?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = match point.id?.point_id_options? {
                    PointIdOptions::Num(n) => ChunkId::try_from(n).ok()?,
                    PointIdOptions::Uuid(_) => return None,
                };
                let payload = (!point.payload.is_empty()).then(|| payload_to_json(point.payload));
                Some(VectorHit {
                    chunk_id: id,
                    score: point.score,
                    payload,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn dim(&self) -> Result<Option<usize>, VectorError> {
        self.known_dim().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_chunk_id_rejected() {
        assert!(point_id(-1).is_err());
        assert_eq!(point_id(42).unwrap(), 42);
    }

    #[test]
    fn test_payload_roundtrips_through_qdrant_values() {
        let json = serde_json::json!({
            "path": "src/main/resources/application.yml",
            "language": "yaml",
            "tags": ["config", true],
            "extra": null,
        });
        let map: HashMap<String, qdrant_client::qdrant::Value> =
            serde_json::from_value(json.clone()).unwrap();
        assert_eq!(payload_to_json(map), json);
    }

    #[test]
    fn test_new_does_not_connect() {
        let index = QdrantIndex::new("http://127.0.0.1:6334", "incidents").unwrap();
        assert_eq!(index.backend_name(), "qdrant");
        assert!(format!("{index:?}").contains("incidents"));
    }
}
