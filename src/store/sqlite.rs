//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Schema: a single `chunks` table keyed by `chunk_id`, with a secondary index
//! on `path`. Writes use `INSERT OR REPLACE` inside one transaction.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::models::{Chunk, ChunkId};

use super::ChunkStore;

/// SQLite implementation of the [`ChunkStore`] trait.
pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to (creating if missing) the database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(db::connect(db_path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let start_line: i64 = row.try_get("start_line")?;
    let end_line: i64 = row.try_get("end_line")?;
    Ok(Chunk {
        chunk_id: row.try_get("chunk_id")?,
        path: row.try_get("path")?,
        language: row.try_get("language")?,
        start_line: usize::try_from(start_line)?,
        end_line: usize::try_from(end_line)?,
        text: row.try_get("text")?,
    })
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                language TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                text TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks (chunk_id, path, language, start_line, end_line, text)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.chunk_id)
            .bind(&chunk.path)
            .bind(&chunk.language)
            .bind(i64::try_from(chunk.start_line)?)
            .bind(i64::try_from(chunk.end_line)?)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT chunk_id, path, language, start_line, end_line, text FROM chunks WHERE chunk_id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn chunks_for_path(&self, path: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, path, language, start_line, end_line, text
            FROM chunks
            WHERE path = ?
            ORDER BY start_line
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(n)?)
    }
}
