//! Embedding error types

use thiserror::Error;

/// Errors raised by the embedding client
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Embedding backend returned {got} vectors for {expected} inputs")]
    MismatchedResponse { expected: usize, got: usize },

    #[error("Embedding configuration error: {0}")]
    Configuration(String),
}

/// Specialized Result type for embedding operations
pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;
