//! Search error types

use thiserror::Error;

/// Errors raised by the retriever and query service
#[derive(Debug, Error)]
pub enum SearchError {
    /// Client-side problem: empty prompt, non-primitive meta
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Embedding(#[from] rephole_embeddings::EmbeddingError),

    #[error(transparent)]
    VectorData(#[from] rephole_vector_data::VectorDataError),

    #[error(transparent)]
    Database(#[from] rephole_meta_data::DatabaseError),
}

/// Specialized Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;
