//! Deterministic in-memory embedding provider for tests

use crate::embedding::traits::EmbeddingProvider;
use crate::EmbeddingResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Embeds texts into deterministic pseudo-vectors derived from their bytes
///
/// Identical texts embed identically, different texts (almost always)
/// differently, which is enough to exercise ranking and storage logic.
/// Tracks how many backend calls were made for idempotence assertions.
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many embed calls reached this provider
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        // FNV-style rolling hash seeds each component
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            state ^= u64::from(byte);
            state = state.wrapping_mul(0x0100_0000_01b3);
        }

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mixed = state.wrapping_add(i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
                ((mixed >> 33) as f32 / (u32::MAX as f32)) - 0.5
            })
            .collect();

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let inputs: Vec<&String> = texts.iter().filter(|t| !t.trim().is_empty()).collect();
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(inputs.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_texts_embed_identically() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["fn a() {}".to_string(), "fn a() {}".to_string()];
        let vectors = provider.embed(&texts).await.unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), 8);
    }

    #[tokio::test]
    async fn blank_input_is_free() {
        let provider = MockEmbeddingProvider::new(8);
        let blank = vec!["  ".to_string()];
        assert!(provider.embed(&blank).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 0);
    }
}
