//! Incident-to-chunks retrieval pipeline.
//!
//! One linear pass, no backtracking:
//!
//! ```text
//! Incident ──► query text ──► embed ──► VectorIndex::search(prefetch_k)
//!                  │                              │
//!                  ▼                              ▼
//!          extract_signals             ChunkStore::get_chunk (stale ids dropped)
//!                  │                              │
//!                  └──────────► rerank ◄──────────┘
//!                                 │
//!                                 ▼
//!             stable sort ──► per-file cap ──► top_k
//! ```
//!
//! The vector search fetches `prefetch_k` hits so that reranking and the
//! per-file cap have room to reorder. If the cap leaves fewer than `top_k`
//! candidates, the shorter list is returned; nothing beyond the prefetch
//! window is consulted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, embed_query, EmbeddingProvider};
use crate::models::{Incident, RetrievedChunk};
use crate::rerank::{path_adjustment, score_chunk_text};
use crate::signals::extract_signals;
use crate::store::{ChunkStore, SqliteChunkStore};
use crate::vector::{open_vector_index, VectorIndex};

/// Tunables for one retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    /// Hits fetched from the vector index before reranking.
    pub prefetch_k: usize,
    /// At most this many results per file path.
    pub max_per_file: usize,
    pub max_log_lines: usize,
    pub max_spans: usize,
    /// Prepended to the query text before embedding only.
    pub query_prefix: String,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 12,
            prefetch_k: 80,
            max_per_file: 2,
            max_log_lines: 40,
            max_spans: 30,
            query_prefix: String::new(),
        }
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten an incident into query text, one field per line, in the order
/// service, symptoms, logs, spans. Logs and spans are truncated to the
/// given bounds.
pub fn incident_to_query_text(incident: &Incident, max_log_lines: usize, max_spans: usize) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(service) = incident.service.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("service={}", service));
    }
    for (key, value) in &incident.symptoms {
        parts.push(format!("{}={}", key, render_value(value)));
    }
    parts.extend(incident.logs.iter().take(max_log_lines).cloned());
    parts.extend(
        incident
            .traces
            .top_spans
            .iter()
            .take(max_spans)
            .map(render_value),
    );

    parts.join("\n")
}

/// Keep at most `max_per_file` items per path, preserving order.
pub fn dedup_per_file(items: Vec<RetrievedChunk>, max_per_file: usize) -> Vec<RetrievedChunk> {
    let mut per_file: HashMap<String, usize> = HashMap::new();
    items
        .into_iter()
        .filter(|item| {
            let count = per_file.entry(item.chunk.path.clone()).or_insert(0);
            if *count >= max_per_file {
                return false;
            }
            *count += 1;
            true
        })
        .collect()
}

/// Retrieve the `top_k` most relevant chunks for an incident.
///
/// An incident with no usable text, or an index that has not been built,
/// yields an empty list. Vector hits whose chunk is missing from the store
/// are dropped.
pub async fn retrieve_topk(
    store: &dyn ChunkStore,
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    incident: &Incident,
    params: &RetrievalParams,
) -> Result<Vec<RetrievedChunk>> {
    let query_text = incident_to_query_text(incident, params.max_log_lines, params.max_spans);
    if query_text.trim().is_empty() || params.top_k == 0 || params.max_per_file == 0 {
        return Ok(Vec::new());
    }

    let signals = extract_signals(&query_text);
    tracing::debug!(
        endpoints = signals.endpoints.len(),
        exceptions = signals.exceptions.len(),
        frames = signals.frames.len(),
        keywords = signals.keywords.len(),
        "extracted incident signals"
    );

    let query_vector = embed_query(embedder, &format!("{}{}", params.query_prefix, query_text)).await?;
    let hits = index.search(&query_vector, params.prefetch_k.max(params.top_k)).await?;

    let mut candidates = Vec::with_capacity(hits.len());
    let mut stale = 0usize;
    for hit in hits {
        let Some(chunk) = store.get_chunk(hit.chunk_id).await? else {
            stale += 1;
            continue;
        };
        let base_score = f64::from(hit.score);
        let rerank_score = score_chunk_text(&chunk.text, &signals) + path_adjustment(&chunk.path);
        candidates.push(RetrievedChunk {
            score: base_score + rerank_score,
            base_score,
            rerank_score,
            chunk,
        });
    }
    if stale > 0 {
        tracing::debug!(stale, "dropped vector hits with no stored chunk");
    }

    // stable: ties keep vector-search order
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut results = dedup_per_file(candidates, params.max_per_file);
    results.truncate(params.top_k);
    Ok(results)
}

/// Retrieve against the index persisted in `index_dir`.
///
/// A directory without a payload store yields an empty list; nothing is
/// created on disk.
pub async fn retrieve_from_dir(
    config: &Config,
    index_dir: &Path,
    incident: &Incident,
    params: &RetrievalParams,
) -> Result<Vec<RetrievedChunk>> {
    let db_path = db::payload_path(index_dir);
    if !db_path.exists() {
        tracing::warn!(index = %index_dir.display(), "no index found, run `incx index` first");
        return Ok(Vec::new());
    }

    let store = SqliteChunkStore::open(&db_path).await?;
    let index = open_vector_index(&config.vector, index_dir)?;
    let embedder = embedding::create_provider(&config.embedding)?;

    let result = retrieve_topk(&store, index.as_ref(), embedder.as_ref(), incident, params).await;
    store.close().await;
    result
}

/// CLI entry point for `incx retrieve`.
pub async fn run_retrieve(
    config: &Config,
    incident_path: &Path,
    index_dir: Option<PathBuf>,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Retrieval requires embeddings. Set [embedding] provider in config.");
    }

    let incident = Incident::from_file(incident_path)?;
    let index_dir = index_dir.unwrap_or_else(|| config.index.dir.clone());

    let mut params = config.retrieval_params();
    if let Some(k) = top_k {
        params.top_k = k;
    }

    let results = retrieve_from_dir(config, &index_dir, &incident, &params).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [score={:.3}] {}:{}-{} ({})",
            i + 1,
            r.score,
            r.chunk.path,
            r.chunk.start_line,
            r.chunk.end_line,
            r.chunk.language
        );
        println!(
            "    base: {:.3}  rerank: {:+.2}  chunk_id: {}",
            r.base_score, r.rerank_score, r.chunk.chunk_id
        );
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbedError;
    use crate::models::{Chunk, ChunkId};
    use crate::store::InMemoryChunkStore;
    use crate::vector::FlatIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always returns the same vector; counts calls.
    struct Constant {
        calls: AtomicUsize,
    }

    impl Constant {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Constant {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(id: ChunkId, path: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            path: path.to_string(),
            language: "java".to_string(),
            start_line: 1,
            end_line: 10,
            text: text.to_string(),
        }
    }

    fn retrieved(path: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            score,
            base_score: score,
            rerank_score: 0.0,
            chunk: chunk(1, path, ""),
        }
    }

    fn incident(logs: &[&str]) -> Incident {
        Incident {
            logs: logs.iter().map(|s| s.to_string()).collect(),
            ..Incident::default()
        }
    }

    /// Store + flat index where chunk `id` has similarity `cos` to the query `[1, 0]`.
    async fn fixture(rows: &[(Chunk, f32)]) -> (InMemoryChunkStore, FlatIndex) {
        let store = InMemoryChunkStore::new();
        let index = FlatIndex::new();
        index.ensure_collection(2).await.unwrap();
        let chunks: Vec<Chunk> = rows.iter().map(|(c, _)| c.clone()).collect();
        store.insert_chunks(&chunks).await.unwrap();
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.chunk_id).collect();
        let vectors: Vec<Vec<f32>> = rows
            .iter()
            .map(|(_, cos)| vec![*cos, (1.0 - cos * cos).sqrt()])
            .collect();
        index.upsert(&ids, &vectors, None).await.unwrap();
        (store, index)
    }

    #[test]
    fn test_query_text_field_order_and_bounds() {
        let incident: Incident = serde_json::from_value(serde_json::json!({
            "service": "payment-api",
            "symptoms": {"p99_ms": 2400, "error_rate": "5%"},
            "logs": ["l1", "l2", "l3"],
            "traces": {"top_spans": ["db.query", {"name": "http", "ms": 900}]}
        }))
        .unwrap();
        let text = incident_to_query_text(&incident, 2, 5);
        assert_eq!(
            text,
            "service=payment-api\nerror_rate=5%\np99_ms=2400\nl1\nl2\ndb.query\n{\"ms\":900,\"name\":\"http\"}"
        );
    }

    #[test]
    fn test_query_text_empty_incident() {
        assert_eq!(incident_to_query_text(&Incident::default(), 40, 30), "");
    }

    #[test]
    fn test_dedup_caps_per_path_in_order() {
        let items = vec![
            retrieved("a", 5.0),
            retrieved("a", 4.0),
            retrieved("b", 3.5),
            retrieved("a", 3.0),
            retrieved("b", 2.0),
            retrieved("b", 1.0),
        ];
        let kept = dedup_per_file(items, 2);
        let got: Vec<(String, f64)> = kept.iter().map(|r| (r.chunk.path.clone(), r.score)).collect();
        assert_eq!(
            got,
            vec![
                ("a".to_string(), 5.0),
                ("a".to_string(), 4.0),
                ("b".to_string(), 3.5),
                ("b".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn test_dedup_zero_cap_keeps_nothing() {
        assert!(dedup_per_file(vec![retrieved("a", 1.0)], 0).is_empty());
    }

    #[tokio::test]
    async fn test_rerank_reorders_vector_hits() {
        let (store, index) = fixture(&[
            (chunk(1, "src/Plain.java", "nothing relevant"), 0.9),
            (chunk(2, "src/Pool.java", "hikaripool config"), 0.5),
        ])
        .await;
        let embedder = Constant::new();
        let results = retrieve_topk(
            &store,
            &index,
            &embedder,
            &incident(&["HikariPool-1 - Connection is not available"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(results[0].chunk.chunk_id, 2);
        assert!((results[0].rerank_score - 1.0).abs() < 1e-9);
        assert!((results[0].score - results[0].base_score - results[0].rerank_score).abs() < 1e-9);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_stale_hits_are_dropped() {
        let (store, index) = fixture(&[(chunk(1, "src/A.java", "a"), 0.8)]).await;
        // vector for a chunk the store has never seen
        index.upsert(&[99], &[vec![1.0, 0.0]], None).await.unwrap();

        let results = retrieve_topk(
            &store,
            &index,
            &Constant::new(),
            &incident(&["something broke"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        let ids: Vec<ChunkId> = results.iter().map(|r| r.chunk.chunk_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_top_k_and_per_file_cap() {
        let (store, index) = fixture(&[
            (chunk(1, "src/A.java", "a"), 0.99),
            (chunk(2, "src/A.java", "a"), 0.98),
            (chunk(3, "src/A.java", "a"), 0.97),
            (chunk(4, "src/B.java", "b"), 0.50),
        ])
        .await;
        let params = RetrievalParams {
            top_k: 3,
            max_per_file: 1,
            ..RetrievalParams::default()
        };
        let results = retrieve_topk(&store, &index, &Constant::new(), &incident(&["x"]), &params)
            .await
            .unwrap();
        // cap leaves two candidates; no backfill
        let ids: Vec<ChunkId> = results.iter().map(|r| r.chunk.chunk_id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedder() {
        let (store, index) = fixture(&[(chunk(1, "src/A.java", "a"), 0.8)]).await;
        let embedder = Constant::new();
        let results = retrieve_topk(
            &store,
            &index,
            &embedder,
            &Incident::default(),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unbuilt_index_returns_empty() {
        let results = retrieve_topk(
            &InMemoryChunkStore::new(),
            &FlatIndex::new(),
            &Constant::new(),
            &incident(&["timeout"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_test_paths_sink() {
        let (store, index) = fixture(&[
            (chunk(1, "src/test/java/PaymentServiceTest.java", "timeout"), 0.95),
            (chunk(2, "src/main/java/PaymentService.java", "timeout"), 0.60),
        ])
        .await;
        let results = retrieve_topk(
            &store,
            &index,
            &Constant::new(),
            &incident(&["request timeout"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(results[0].chunk.chunk_id, 2);
        assert!((results[1].rerank_score - (1.0 - 3.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_vector_order() {
        // base 1.0 + rerank 0.0 ties with base 0.0 + keyword 1.0
        let (store, index) = fixture(&[
            (chunk(2, "src/Plain.java", "nothing relevant"), 1.0),
            (chunk(1, "src/Other.java", "read timeout"), 0.0),
        ])
        .await;
        let results = retrieve_topk(
            &store,
            &index,
            &Constant::new(),
            &incident(&["request timeout"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, results[1].score);
        assert!(results[0].base_score > results[1].base_score);
        let ids: Vec<ChunkId> = results.iter().map(|r| r.chunk.chunk_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_missing_index_dir_is_empty_and_untouched() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index_dir = tmp.path().join("never-built");
        let results = retrieve_from_dir(
            &Config::default(),
            &index_dir,
            &incident(&["timeout"]),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert!(!index_dir.exists());
    }
}
