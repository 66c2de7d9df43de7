//! End-to-end tests: index a toy repository on disk, then retrieve against it
//! through the SQLite chunk store and the persisted flat vector index.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use async_trait::async_trait;
use incident_context::config::Config;
use incident_context::db;
use incident_context::embedding::EmbeddingProvider;
use incident_context::error::{EmbedError, VectorError};
use incident_context::index::build_index;
use incident_context::models::{Incident, IndexMetadata};
use incident_context::retrieve::{retrieve_topk, RetrievalParams};
use incident_context::store::{ChunkStore, InMemoryChunkStore, SqliteChunkStore};
use incident_context::vector::{FlatIndex, VectorIndex};
use tempfile::TempDir;

// ─── Test Embedder ──────────────────────────────────────────────────

/// Hashed bag-of-words: every lowercase alphanumeric token bumps one bucket.
struct BagOfWords {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dims];
                for token in text
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    let mut h = DefaultHasher::new();
                    token.to_lowercase().hash(&mut h);
                    v[(h.finish() % self.dims as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

const EMBEDDER: BagOfWords = BagOfWords { dims: 64 };

// ─── Fixtures ───────────────────────────────────────────────────────

const APPLICATION_YML: &str = "\
spring:
  datasource:
    url: jdbc:postgresql://db:5432/payments
    hikari:
      connection-timeout: 30000
      maximum-pool-size: 10
";

const PAYMENT_SERVICE: &str = "\
package com.acme.payments.service;

public class PaymentService {
    private final LedgerClient ledger;

    public Receipt charge(Order order) {
        try {
            return ledger.post(order);
        } catch (SocketTimeoutException e) {
            // upstream timeout while posting to the ledger
            throw new PaymentTimeoutException(order.id(), e);
        }
    }
}
";

const PAYMENT_SERVICE_TEST: &str = "\
class PaymentServiceTest {
    void chargeTimesOut() { assertThrows(PaymentTimeoutException.class, () -> service.charge(order)); }
}
";

fn toy_repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, content) in [
        ("src/main/resources/application.yml", APPLICATION_YML),
        (
            "src/main/java/com/acme/payments/service/PaymentService.java",
            PAYMENT_SERVICE,
        ),
        (
            "src/test/java/com/acme/payments/service/PaymentServiceTest.java",
            PAYMENT_SERVICE_TEST,
        ),
        ("build/generated/Stale.java", "class Stale {}"),
    ] {
        let path = tmp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    tmp
}

fn incident() -> Incident {
    serde_json::from_value(serde_json::json!({
        "service": "payments",
        "symptoms": {"error_rate": "12%"},
        "logs": [
            "ERROR charge failed: com.acme.payments.PaymentTimeoutException: upstream timeout",
            "    at com.acme.payments.service.PaymentService.charge(PaymentService.java:11)"
        ]
    }))
    .unwrap()
}

async fn build(repo: &Path, out: &Path) -> IndexMetadata {
    build_with(repo, out, &EMBEDDER).await
}

async fn build_with(repo: &Path, out: &Path, embedder: &BagOfWords) -> IndexMetadata {
    let store = SqliteChunkStore::open(&db::payload_path(out)).await.unwrap();
    let vectors = FlatIndex::create(out);
    let meta = build_index(&Config::default(), repo, out, &store, &vectors, embedder)
        .await
        .unwrap();
    store.close().await;
    meta
}

async fn retrieve(out: &Path, params: &RetrievalParams) -> Vec<(String, f64)> {
    let store = SqliteChunkStore::open(&db::payload_path(out)).await.unwrap();
    let vectors = FlatIndex::open(out).unwrap();
    let results = retrieve_topk(&store, &vectors, &EMBEDDER, &incident(), params)
        .await
        .unwrap();
    store.close().await;
    results
        .into_iter()
        .map(|r| (r.chunk.path, r.score))
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_service_chunk_outranks_config_chunk() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    let meta = build(repo.path(), out.path()).await;

    // test sources and build output are never indexed
    assert_eq!(meta.chunks, 2);
    assert_eq!(meta.dim, 64);

    let params = RetrievalParams {
        top_k: 1,
        ..RetrievalParams::default()
    };
    let results = retrieve(out.path(), &params).await;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].0,
        "src/main/java/com/acme/payments/service/PaymentService.java"
    );

    let all = retrieve(out.path(), &RetrievalParams::default()).await;
    let paths: Vec<&str> = all.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "src/main/java/com/acme/payments/service/PaymentService.java",
            "src/main/resources/application.yml",
        ]
    );
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    build(repo.path(), out.path()).await;
    let first = retrieve(out.path(), &RetrievalParams::default()).await;

    build(repo.path(), out.path()).await;
    let second = retrieve(out.path(), &RetrievalParams::default()).await;

    let store = SqliteChunkStore::open(&db::payload_path(out.path()))
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    store.close().await;
    assert_eq!(FlatIndex::open(out.path()).unwrap().len(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_rebuild_after_deleting_file_forgets_it() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    build(repo.path(), out.path()).await;

    fs::remove_file(repo.path().join("src/main/resources/application.yml")).unwrap();
    let meta = build(repo.path(), out.path()).await;
    assert_eq!(meta.chunks, 1);
    assert_eq!(FlatIndex::open(out.path()).unwrap().len(), 1);

    let results = retrieve(out.path(), &RetrievalParams::default()).await;
    let paths: Vec<&str> = results.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        paths,
        vec!["src/main/java/com/acme/payments/service/PaymentService.java"]
    );
}

#[tokio::test]
async fn test_rebuild_with_new_model_dimension() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    build(repo.path(), out.path()).await;

    let meta = build_with(repo.path(), out.path(), &BagOfWords { dims: 32 }).await;
    assert_eq!(meta.dim, 32);
    let vectors = FlatIndex::open(out.path()).unwrap();
    assert_eq!(vectors.dim().await.unwrap(), Some(32));
    assert_eq!(vectors.len(), 2);
}

#[tokio::test]
async fn test_hits_without_stored_chunks_are_dropped() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    build(repo.path(), out.path()).await;

    // vectors on disk, but a store that has never seen the chunks
    let results = retrieve_topk(
        &InMemoryChunkStore::new(),
        &FlatIndex::open(out.path()).unwrap(),
        &EMBEDDER,
        &incident(),
        &RetrievalParams::default(),
    )
    .await
    .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_retrieval_before_any_build_is_empty() {
    let out = TempDir::new().unwrap();
    assert!(retrieve(out.path(), &RetrievalParams::default())
        .await
        .is_empty());
}

#[tokio::test]
async fn test_query_dimension_mismatch_fails() {
    let repo = toy_repo();
    let out = TempDir::new().unwrap();
    build(repo.path(), out.path()).await;

    let store = SqliteChunkStore::open(&db::payload_path(out.path()))
        .await
        .unwrap();
    let vectors = FlatIndex::open(out.path()).unwrap();
    assert_eq!(vectors.dim().await.unwrap(), Some(64));

    let err = retrieve_topk(
        &store,
        &vectors,
        &BagOfWords { dims: 32 },
        &incident(),
        &RetrievalParams::default(),
    )
    .await
    .unwrap_err();
    store.close().await;

    assert!(matches!(
        err.downcast_ref::<VectorError>(),
        Some(VectorError::DimensionMismatch {
            expected: 64,
            actual: 32
        })
    ));
}
