//! # Incident Context CLI (`incx`)
//!
//! Builds a chunk index over a source repository and retrieves the chunks
//! most relevant to a production incident.
//!
//! ## Usage
//!
//! ```bash
//! incx --config ./config/incx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `incx init` | Create the chunk payload database |
//! | `incx index --repo <dir>` | Scan, chunk, embed and index a repository |
//! | `incx retrieve --incident <file>` | Rank repository chunks for an incident |
//! | `incx get <chunk_id>` | Print one stored chunk |
//! | `incx stats` | Show what the index contains |
//!
//! Diagnostics go to stderr through `tracing` (`RUST_LOG`, default `info`);
//! results go to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use incident_context::config::{self, Config};
use incident_context::error::IndexError;
use incident_context::models::ChunkId;
use incident_context::store::{ChunkStore, SqliteChunkStore};
use incident_context::{db, get, index, retrieve, stats};

/// Incident Context: retrieve the repository code most relevant to a
/// production incident.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/incx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "incx",
    about = "Incident Context: repository retrieval for production incidents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/incx.toml`. When the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/incx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the chunk payload database in the index directory.
    ///
    /// Idempotent: running it on an existing index is safe.
    Init {
        /// Index directory (defaults to `[index].dir`).
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Build the index for a repository.
    ///
    /// Walks the repository, chunks every eligible file, stores the chunks,
    /// embeds them and upserts the vectors. Exits with status 2 when the
    /// filters leave nothing to index.
    Index {
        /// Repository root to scan.
        #[arg(long)]
        repo: PathBuf,

        /// Output index directory (defaults to `[index].dir`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Retrieve the most relevant chunks for an incident.
    Retrieve {
        /// Incident JSON file: `service`, `symptoms`, `logs`, `traces.top_spans`.
        #[arg(long)]
        incident: PathBuf,

        /// Index directory (defaults to `[index].dir`).
        #[arg(long)]
        index: Option<PathBuf>,

        /// Number of chunks to return (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result list as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print one stored chunk by id.
    Get {
        chunk_id: ChunkId,

        /// Index directory (defaults to `[index].dir`).
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Show index metadata and stored chunk count.
    Stats {
        /// Index directory (defaults to `[index].dir`).
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init { index } => {
            let dir = index.unwrap_or_else(|| cfg.index.dir.clone());
            let store = SqliteChunkStore::open(&db::payload_path(&dir)).await?;
            store.init().await?;
            store.close().await;
            println!("Index storage initialized at {}.", dir.display());
        }
        Commands::Index { repo, out } => {
            index::run_index(&cfg, &repo, out).await?;
        }
        Commands::Retrieve {
            incident,
            index,
            top_k,
            json,
        } => {
            retrieve::run_retrieve(&cfg, &incident, index, top_k, json).await?;
        }
        Commands::Get { chunk_id, index } => {
            get::run_get(&cfg, chunk_id, index.as_deref()).await?;
        }
        Commands::Stats { index } => {
            stats::run_stats(&cfg, index.as_deref()).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<IndexError>(), Some(IndexError::NoChunks)) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
