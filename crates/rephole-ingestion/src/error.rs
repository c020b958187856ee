//! Ingestion error types

use thiserror::Error;

/// Errors raised by the producer and worker
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Bad request: malformed URL, unusable repo id, non-primitive meta
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Git(#[from] rephole_meta_data::GitError),

    #[error(transparent)]
    Database(#[from] rephole_meta_data::DatabaseError),

    #[error(transparent)]
    Embedding(#[from] rephole_embeddings::EmbeddingError),

    #[error(transparent)]
    VectorData(#[from] rephole_vector_data::VectorDataError),

    #[error("Ingestion error: {0}")]
    Other(String),
}

/// Specialized Result type for ingestion operations
pub type IngestionResult<T> = std::result::Result<T, IngestionError>;
