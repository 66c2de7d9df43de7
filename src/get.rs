//! Chunk lookup by id.
//!
//! Backs the `incx get` command: fetches one stored chunk from the payload
//! database of an index directory.

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::{Chunk, ChunkId};
use crate::store::{ChunkStore, SqliteChunkStore};

/// Fetch one chunk, failing with a clear message when it is absent.
pub async fn get_chunk(store: &dyn ChunkStore, chunk_id: ChunkId) -> Result<Chunk> {
    match store.get_chunk(chunk_id).await? {
        Some(chunk) => Ok(chunk),
        None => bail!("Chunk not found: {}", chunk_id),
    }
}

/// CLI entry point for `incx get`.
pub async fn run_get(config: &Config, chunk_id: ChunkId, index_dir: Option<&Path>) -> Result<()> {
    let index_dir = index_dir.unwrap_or(config.index.dir.as_path());
    let db_path = db::payload_path(index_dir);
    if !db_path.exists() {
        bail!("No index at {}. Run `incx index` first.", index_dir.display());
    }

    let store = SqliteChunkStore::open(&db_path).await?;
    let result = get_chunk(&store, chunk_id).await;
    store.close().await;
    let chunk = result?;

    println!("--- Chunk ---");
    println!("chunk_id:   {}", chunk.chunk_id);
    println!("path:       {}", chunk.path);
    println!("language:   {}", chunk.language);
    println!("lines:      {}-{}", chunk.start_line, chunk.end_line);
    println!();
    println!("--- Text ---");
    println!("{}", chunk.text);

    Ok(())
}
