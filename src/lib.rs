//! # Incident Context
//!
//! Retrieval of source-repository fragments relevant to a production
//! incident, used to ground downstream incident reports.
//!
//! A repository is split into overlapping line-range chunks, stored in a
//! keyed payload store and embedded into a pluggable vector index. At query
//! time the incident is flattened into text, embedded, searched, and the hits
//! are reranked with deterministic lexical signals (exception names, stack
//! frames, endpoints, infra keywords) plus path heuristics.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌──────────────┐
//! │  Scanner   │──▶│ Chunker  │──▶│  ChunkStore   │  payload.sqlite
//! │  (walkdir) │   │          │   └──────────────┘
//! └────────────┘   │          │   ┌──────────────┐
//!                  │          │──▶│ VectorIndex   │  flat | qdrant
//!                  └──────────┘   └──────┬───────┘
//!                                        │
//!   Incident ──▶ signals + embed ──▶ search ──▶ rerank ──▶ dedup ──▶ top_k
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! incx index --repo ../payment-service       # build ./data/index
//! incx retrieve --incident incident.json     # ranked chunks
//! incx stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed errors callers branch on |
//! | [`models`] | Core data types |
//! | [`chunk`] | Line-window chunking |
//! | [`scanner`] | Repository walk and file filters |
//! | [`db`] | SQLite connection |
//! | [`store`] | Chunk payload storage |
//! | [`vector`] | Vector index abstraction and backends |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`signals`] | Incident signal extraction |
//! | [`rerank`] | Signal and path scoring |
//! | [`index`] | Index build pipeline |
//! | [`retrieve`] | Retrieval orchestration |
//! | [`get`] | Chunk lookup |
//! | [`stats`] | Index statistics |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod get;
pub mod index;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod scanner;
pub mod signals;
pub mod stats;
pub mod store;
pub mod vector;
