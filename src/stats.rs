//! Index statistics.
//!
//! Summarises one index directory: the build metadata written by
//! `incx index`, the number of stored chunks, and on-disk sizes. Used by
//! `incx stats` to confirm a build completed.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::IndexMetadata;
use crate::store::{ChunkStore, SqliteChunkStore};

/// Run the stats command for `index_dir` (default `[index].dir`).
pub async fn run_stats(config: &Config, index_dir: Option<&Path>) -> Result<()> {
    let index_dir = index_dir.unwrap_or(config.index.dir.as_path());
    let db_path = db::payload_path(index_dir);

    println!("Incident Context — Index Stats");
    println!("==============================");
    println!();
    println!("  Index dir:   {}", index_dir.display());

    let Some(meta) = IndexMetadata::read(index_dir)? else {
        println!("  No completed build found. Run `incx index --repo <dir>`.");
        println!();
        return Ok(());
    };

    let stored = if db_path.exists() {
        let store = SqliteChunkStore::open(&db_path).await?;
        let count = store.count().await;
        store.close().await;
        count?
    } else {
        0
    };

    println!("  Repository:  {}", meta.repo_root.display());
    println!("  Built:       {}", meta.created_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  Model:       {} (dim {})", meta.embed_model, meta.dim);
    println!("  Backend:     {}", meta.vector_backend);
    println!(
        "  Chunking:    {} lines, {} overlap",
        meta.chunk_max_lines, meta.chunk_overlap
    );
    println!("  Chunks:      {} indexed, {} stored", meta.chunks, stored);
    println!("  Payload DB:  {}", format_bytes(dir_entry_size(&db_path)));
    if meta.vector_backend == "flat" {
        println!(
            "  Vectors:     {}",
            format_bytes(dir_entry_size(&index_dir.join("flat_index.f32")))
        );
    }
    println!();

    Ok(())
}

fn dir_entry_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn test_stats_without_build_is_ok() {
        let tmp = tempfile::TempDir::new().unwrap();
        run_stats(&Config::default(), Some(tmp.path())).await.unwrap();
    }
}
