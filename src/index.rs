//! Index build: scan → chunk → store → embed → upsert → metadata.
//!
//! The whole chunk list is written to the [`ChunkStore`] in one batch, then
//! embedded and upserted into the [`VectorIndex`] in slices of
//! `[index].batch_size`. Within a slice, [`embed_adaptive`] starts at
//! `[embedding].batch_size` and halves on resource exhaustion.
//!
//! Re-running a build over the same repository overwrites stored records by
//! chunk id. The flat vector index is rebuilt from scratch, so chunks that
//! no longer exist are not searchable afterwards.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, embed_adaptive, EmbeddingProvider};
use crate::error::IndexError;
use crate::models::{Chunk, ChunkId, IndexMetadata};
use crate::scanner::scan_repository;
use crate::store::{ChunkStore, SqliteChunkStore};
use crate::vector::{create_vector_index, VectorIndex};

fn payload(chunk: &Chunk) -> serde_json::Value {
    serde_json::json!({
        "path": chunk.path,
        "language": chunk.language,
        "start_line": chunk.start_line,
        "end_line": chunk.end_line,
    })
}

/// Build the index for `repo` and write `index_meta.json` into `index_dir`.
///
/// Fails with [`IndexError::NoChunks`] when filtering leaves nothing to
/// index; in that case neither store nor vector index is touched.
pub async fn build_index(
    config: &Config,
    repo: &Path,
    index_dir: &Path,
    store: &dyn ChunkStore,
    vectors: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
) -> Result<IndexMetadata> {
    let params = config.chunking.params()?;
    let report = scan_repository(repo, &config.index.include_prefixes, params)?;
    tracing::info!(
        files_seen = report.files_seen,
        files_indexed = report.files_indexed,
        files_skipped = report.files_skipped,
        chunks = report.chunks.len(),
        "scanned repository"
    );

    let chunks = report.chunks;
    if chunks.is_empty() {
        return Err(IndexError::NoChunks.into());
    }

    store.init().await?;
    store.insert_chunks(&chunks).await?;

    let passage_prefix = config.embedding.passage_prefix.as_deref().unwrap_or("");
    let total = chunks.len();
    let mut dim: Option<usize> = None;
    let mut done = 0usize;

    for batch in chunks.chunks(config.index.batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|c| format!("{}{}", passage_prefix, c.text))
            .collect();
        let embedded = embed_adaptive(embedder, &texts, config.embedding.batch_size).await?;

        if dim.is_none() {
            let first = embedded.first().map_or(0, Vec::len);
            if first == 0 {
                bail!("embedding provider '{}' returned an empty vector", embedder.model_name());
            }
            vectors.ensure_collection(first).await?;
            dim = Some(first);
        }

        let ids: Vec<ChunkId> = batch.iter().map(|c| c.chunk_id).collect();
        let payloads: Vec<serde_json::Value> = batch.iter().map(payload).collect();
        vectors.upsert(&ids, &embedded, Some(&payloads)).await?;

        done += batch.len();
        tracing::info!(done, total, "embedded chunks");
    }

    vectors.flush().await?;

    let dim = match vectors.dim().await? {
        Some(d) => d,
        None => dim.unwrap_or(0),
    };
    let meta = IndexMetadata {
        repo_root: repo.canonicalize().unwrap_or_else(|_| repo.to_path_buf()),
        embed_model: embedder.model_name().to_string(),
        embed_batch_size: config.embedding.batch_size,
        chunk_max_lines: params.max_lines(),
        chunk_overlap: params.overlap(),
        dim,
        chunks: total,
        vector_backend: vectors.backend_name().to_string(),
        created_at: Utc::now(),
    };
    let meta_path = meta.write(index_dir)?;
    tracing::info!(path = %meta_path.display(), "wrote index metadata");

    Ok(meta)
}

/// CLI entry point for `incx index`.
pub async fn run_index(config: &Config, repo: &Path, out: Option<PathBuf>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }

    let index_dir = out.unwrap_or_else(|| config.index.dir.clone());
    std::fs::create_dir_all(&index_dir)
        .with_context(|| format!("Failed to create index directory: {}", index_dir.display()))?;

    let store = SqliteChunkStore::open(&db::payload_path(&index_dir)).await?;
    let vectors = create_vector_index(&config.vector, &index_dir)?;
    let embedder = embedding::create_provider(&config.embedding)?;

    let result = build_index(
        config,
        repo,
        &index_dir,
        &store,
        vectors.as_ref(),
        embedder.as_ref(),
    )
    .await;
    store.close().await;
    if let Err(e) = &result {
        if matches!(e.downcast_ref::<IndexError>(), Some(IndexError::NoChunks)) {
            tracing::warn!(
                repo = %repo.display(),
                include_prefixes = ?config.index.include_prefixes,
                "no chunks produced; no file matched the include prefixes"
            );
        }
    }
    let meta = result?;

    println!("index built");
    println!("  repo:      {}", meta.repo_root.display());
    println!("  index:     {}", index_dir.display());
    println!("  chunks:    {}", meta.chunks);
    println!("  model:     {} (dim {})", meta.embed_model, meta.dim);
    println!("  backend:   {}", meta.vector_backend);

    Ok(())
}
