//! In-memory [`ChunkStore`] implementation for tests and ephemeral runs.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`. No lock is held across an
//! await point.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Chunk, ChunkId};

use super::ChunkStore;

/// In-memory chunk store.
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<BTreeMap<ChunkId, Chunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory chunk store lock poisoned")
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for c in chunks {
            stored.insert(c.chunk_id, c.clone());
        }
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<Chunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        Ok(stored.get(&chunk_id).cloned())
    }

    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut found: Vec<Chunk> = stored.values().filter(|c| c.path == path).cloned().collect();
        found.sort_by_key(|c| c.start_line);
        Ok(found)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: ChunkId, path: &str, start: usize, text: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            path: path.to_string(),
            language: "java".to_string(),
            start_line: start,
            end_line: start + 4,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let store = InMemoryChunkStore::new();
        store.insert_chunks(&[chunk(1, "a.java", 1, "old")]).await.unwrap();
        store.insert_chunks(&[chunk(1, "a.java", 1, "new")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get_chunk(1).await.unwrap().unwrap().text, "new");
    }

    #[tokio::test]
    async fn test_missing_chunk_is_none() {
        let store = InMemoryChunkStore::new();
        assert!(store.get_chunk(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunks_for_path_ordered() {
        let store = InMemoryChunkStore::new();
        store
            .insert_chunks(&[
                chunk(3, "a.java", 9, "c"),
                chunk(1, "a.java", 1, "a"),
                chunk(2, "b.java", 1, "b"),
            ])
            .await
            .unwrap();
        let found = store.chunks_for_path("a.java").await.unwrap();
        let starts: Vec<usize> = found.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, vec![1, 9]);
    }
}
