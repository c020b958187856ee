//! Vector storage error types

use thiserror::Error;

/// Errors raised by the vector index adapter
#[derive(Debug, Error)]
pub enum VectorDataError {
    #[error("Vector storage error: {0}")]
    Storage(String),

    /// Guard against chunker regressions and metadata collisions: a batch
    /// must never carry the same chunk id twice.
    #[error("Duplicate chunk ids in upsert batch: {}", .0.join(", "))]
    DuplicateChunkIds(Vec<String>),

    /// The backing store returned a hit the adapter cannot interpret
    #[error("Malformed search result: {0}")]
    MalformedResult(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Specialized Result type for vector storage operations
pub type VectorDataResult<T> = std::result::Result<T, VectorDataError>;
