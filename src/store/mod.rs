//! Chunk payload storage.
//!
//! The [`ChunkStore`] trait is the keyed store the retrieval pipeline hydrates
//! vector hits from. Two backends are provided:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | SQLite | [`sqlite`] | Durable `payload.sqlite` next to the vector index |
//! | In-memory | [`memory`] | Tests and ephemeral runs |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkId};

pub use memory::InMemoryChunkStore;
pub use sqlite::SqliteChunkStore;

/// Abstract keyed storage for chunk records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`init`](ChunkStore::init) | Prepare storage; safe on existing storage |
/// | [`insert_chunks`](ChunkStore::insert_chunks) | Batch upsert by `chunk_id`, last write wins |
/// | [`get_chunk`](ChunkStore::get_chunk) | Point lookup; `None` when absent |
/// | [`chunks_for_path`](ChunkStore::chunks_for_path) | Secondary lookup by file path |
/// | [`count`](ChunkStore::count) | Number of stored chunks |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Idempotently create the schema.
    async fn init(&self) -> Result<()>;

    /// Insert or replace chunks as one logical batch.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Look up a chunk by id. A missing id is `Ok(None)`, not an error:
    /// a stale vector index may reference chunks that no longer exist.
    async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<Chunk>>;

    /// All chunks of one file, ordered by start line.
    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>>;

    async fn count(&self) -> Result<usize>;
}
