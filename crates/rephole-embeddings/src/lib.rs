//! Embedding client for rephole
//!
//! Talks to an OpenAI-compatible `/embeddings` endpoint. Inputs are
//! sanitized and truncated client-side; transport errors propagate to the
//! caller so the job queue owns all retrying.

pub mod embedding;
pub mod error;

pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddingClient};
pub use error::{EmbeddingError, EmbeddingResult};
