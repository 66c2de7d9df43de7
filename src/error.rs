//! Typed errors for the conditions callers must tell apart.
//!
//! Most of the crate returns [`anyhow::Result`]. The enums here exist for
//! failures that drive control flow: batch-size halving keys off
//! [`EmbedError::ResourceExhausted`], and dimension safety is asserted on
//! [`VectorError::DimensionMismatch`].

/// Invalid configuration detected before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("chunking.max_lines must be > 0")]
    ZeroMaxLines,

    #[error("chunking.overlap ({overlap}) must be smaller than chunking.max_lines ({max_lines})")]
    OverlapTooLarge { overlap: usize, max_lines: usize },

    #[error("{0}")]
    Invalid(String),
}

/// Errors raised by a [`VectorIndex`](crate::vector::VectorIndex) backend.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    /// A vector's length differs from the index dimensionality.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `ids`, `vectors` and `payloads` of one upsert differ in length.
    #[error("upsert length mismatch: {ids} ids, {vectors} vectors, {payloads} payloads")]
    LengthMismatch {
        ids: usize,
        vectors: usize,
        payloads: usize,
    },

    /// Vectors were written before `ensure_collection` fixed a dimensionality.
    #[error("collection not initialised: call ensure_collection first")]
    NoCollection,

    #[error("vector backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The backend ran out of memory for this batch; a smaller batch may succeed.
    #[error("embedding backend exhausted resources: {0}")]
    ResourceExhausted(String),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding provider is disabled")]
    Disabled,
}

/// Outcome of an index build that produced nothing to index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no chunks produced: check index.include_prefixes and the repository path")]
    NoChunks,
}
