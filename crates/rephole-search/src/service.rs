//! Query service: prompt in, ranked results out

use crate::error::{SearchError, SearchResult};
use crate::retriever::{RetrievedItem, Retriever};
use rephole_embeddings::EmbeddingProvider;
use rephole_vector_data::Filter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

const DEFAULT_K: usize = 5;
const MAX_K: usize = 100;

/// A search request body
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub prompt: String,
    /// Accepted loosely: anything that is not a positive integer falls back
    /// to the default
    pub k: Option<Value>,
    pub meta: Option<Map<String, Value>>,
}

/// One result entry as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub content: String,
    #[serde(rename = "repoId")]
    pub repo_id: String,
    pub metadata: Map<String, Value>,
}

/// Embeds prompts and runs the retriever in parent or chunk mode
pub struct QueryService {
    embeddings: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
}

impl QueryService {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>, retriever: Retriever) -> Self {
        Self {
            embeddings,
            retriever,
        }
    }

    /// Parent mode: results are full file bodies
    ///
    /// # Errors
    ///
    /// `BadRequest` for an empty prompt or non-primitive meta; storage and
    /// embedding failures propagate.
    #[tracing::instrument(skip(self, request), fields(repo_id))]
    pub async fn search(
        &self,
        repo_id: &str,
        request: &SearchRequest,
    ) -> SearchResult<Vec<QueryHit>> {
        let (vector, k, filter) = self.prepare(repo_id, request).await?;
        let items = self.retriever.retrieve(vector, k, Some(&filter)).await?;
        Ok(items.into_iter().map(to_hit).collect())
    }

    /// Chunk mode: results are individual chunks
    ///
    /// # Errors
    ///
    /// Same as [`Self::search`].
    #[tracing::instrument(skip(self, request), fields(repo_id))]
    pub async fn search_chunks(
        &self,
        repo_id: &str,
        request: &SearchRequest,
    ) -> SearchResult<Vec<QueryHit>> {
        let (vector, k, filter) = self.prepare(repo_id, request).await?;
        let items = self
            .retriever
            .retrieve_chunks(vector, k, Some(&filter))
            .await?;
        Ok(items.into_iter().map(to_hit).collect())
    }

    async fn prepare(
        &self,
        repo_id: &str,
        request: &SearchRequest,
    ) -> SearchResult<(Vec<f32>, usize, Filter)> {
        let correlation_id = rephole_common::CorrelationId::new();
        let k = clamp_k(request.k.as_ref());
        let filter = build_filter(repo_id, request.meta.as_ref())?;
        tracing::info!(correlation_id = %correlation_id, repo_id, k, "Running semantic query");

        let prompt = vec![request.prompt.clone()];
        let mut vectors = self.embeddings.embed(&prompt).await?;
        let Some(vector) = vectors.pop() else {
            return Err(SearchError::BadRequest(
                "prompt is empty after sanitization".into(),
            ));
        };

        Ok((vector, k, filter))
    }
}

fn to_hit(item: RetrievedItem) -> QueryHit {
    QueryHit {
        id: item.id,
        content: item.content,
        repo_id: item.repo_id,
        metadata: item.metadata,
    }
}

/// Clamp `k` to [1, 100]; absent, non-integer, or non-positive values
/// default to 5
fn clamp_k(k: Option<&Value>) -> usize {
    match k.and_then(Value::as_i64) {
        Some(v) if v >= 1 => (v as usize).min(MAX_K),
        _ => DEFAULT_K,
    }
}

/// Assemble the search filter: user meta first, then `repoId`, so the path
/// parameter always wins on conflict
fn build_filter(repo_id: &str, meta: Option<&Map<String, Value>>) -> SearchResult<Filter> {
    let mut filter = Filter::new();

    if let Some(meta) = meta {
        for (key, value) in meta {
            if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                return Err(SearchError::BadRequest(format!(
                    "meta.{key} must be a primitive (string, number, or boolean)"
                )));
            }
            filter.insert(key.clone(), value.clone());
        }
    }

    filter.insert("repoId".into(), Value::String(repo_id.to_string()));
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_defaults_and_clamps() {
        assert_eq!(clamp_k(None), 5);
        assert_eq!(clamp_k(Some(&Value::from(0))), 5);
        assert_eq!(clamp_k(Some(&Value::from(-3))), 5);
        assert_eq!(clamp_k(Some(&Value::from(2.5))), 5);
        assert_eq!(clamp_k(Some(&Value::String("ten".into()))), 5);
        assert_eq!(clamp_k(Some(&Value::from(1))), 1);
        assert_eq!(clamp_k(Some(&Value::from(100))), 100);
        assert_eq!(clamp_k(Some(&Value::from(250))), 100);
    }

    #[test]
    fn filter_merges_meta_but_repo_id_wins() {
        let mut meta = Map::new();
        meta.insert("env".into(), Value::String("prod".into()));
        meta.insert("repoId".into(), Value::String("spoofed".into()));

        let filter = build_filter("demo", Some(&meta)).unwrap();
        assert_eq!(filter.get("env").and_then(Value::as_str), Some("prod"));
        assert_eq!(filter.get("repoId").and_then(Value::as_str), Some("demo"));
    }

    #[test]
    fn non_primitive_meta_is_a_bad_request() {
        let mut meta = Map::new();
        meta.insert("tags".into(), serde_json::json!(["a"]));
        let err = build_filter("demo", Some(&meta)).unwrap_err();
        assert!(matches!(err, SearchError::BadRequest(_)));
    }
}
