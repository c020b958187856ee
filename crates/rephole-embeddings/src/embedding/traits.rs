//! Embedding provider abstraction

use crate::EmbeddingResult;
use async_trait::async_trait;

/// A backend that turns text into dense vectors
///
/// Contract:
/// - Empty or blank-only input returns an empty result without touching the
///   backend.
/// - Each input is sanitized (trimmed, newlines collapsed to spaces) and
///   truncated to the model context; empties are dropped.
/// - Output length equals the count of non-empty sanitized inputs, in the
///   same order.
/// - Transport errors propagate; retries live at the job level, not here.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Vector dimension produced by this model
    fn dimension(&self) -> usize;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}
