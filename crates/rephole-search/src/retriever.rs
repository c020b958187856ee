//! Parent-child retrieval
//!
//! The index holds small chunks (children), each pointing at its source file
//! (parent). Search runs against children; parent mode returns the full
//! parent bodies, chunk mode the children themselves. Result order is the
//! relevance ranking; nothing is re-scored after the blob fetch.

use crate::error::SearchResult;
use rephole_meta_data::BlobStore;
use rephole_vector_data::{Filter, SearchHit, VectorStorage};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Children fetched per requested parent; several children of one parent
/// often crowd the top of the ranking
const PARENT_OVERFETCH: usize = 3;

/// A retrieval result: either a full parent file or a single chunk
#[derive(Debug, Clone)]
pub struct RetrievedItem {
    /// Parent mode: the file path; chunk mode: the canonical chunk id
    pub id: String,
    pub content: String,
    pub repo_id: String,
    pub metadata: Map<String, Value>,
}

/// Two-tier retriever over the vector index and the blob store
pub struct Retriever {
    vectors: Arc<dyn VectorStorage>,
    blobs: Arc<dyn BlobStore>,
}

impl Retriever {
    pub fn new(vectors: Arc<dyn VectorStorage>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { vectors, blobs }
    }

    /// Parent mode: search children, return up to `k` full parent bodies
    ///
    /// Falls back to orphan children (hits with no `parentId` but non-empty
    /// content) when no hit references a parent.
    ///
    /// # Errors
    ///
    /// Propagates vector search and blob fetch failures.
    #[tracing::instrument(skip(self, query_vector, filter), fields(k))]
    pub async fn retrieve(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filter: Option<&Filter>,
    ) -> SearchResult<Vec<RetrievedItem>> {
        let hits = self
            .vectors
            .similarity_search(query_vector, k.saturating_mul(PARENT_OVERFETCH), filter)
            .await?;

        // Unique parents in rank order, stopping at k; orphans collected as
        // the fallback result
        let mut parent_order: Vec<(String, String)> = Vec::new();
        let mut orphans: Vec<SearchHit> = Vec::new();

        for hit in hits {
            if parent_order.len() >= k {
                break;
            }
            match hit.parent_id() {
                Some(parent) => {
                    let repo_id = hit_repo_id(&hit);
                    let key = (repo_id, parent.to_string());
                    if !parent_order.contains(&key) {
                        parent_order.push(key);
                    }
                }
                None => {
                    if !hit.content.is_empty() {
                        orphans.push(hit);
                    }
                }
            }
        }

        if parent_order.is_empty() {
            return Ok(orphans
                .into_iter()
                .map(|hit| {
                    let repo_id = hit_repo_id(&hit);
                    RetrievedItem {
                        id: hit.id,
                        content: hit.content,
                        repo_id,
                        metadata: hit.metadata,
                    }
                })
                .collect());
        }

        // Batch the blob fetches per repo, then restore first-seen order.
        // Missing blobs are silently skipped (sparse results are expected).
        let mut ids_by_repo: HashMap<String, Vec<String>> = HashMap::new();
        for (repo_id, parent) in &parent_order {
            ids_by_repo
                .entry(repo_id.clone())
                .or_default()
                .push(parent.clone());
        }

        let mut fetched: HashMap<(String, String), RetrievedItem> = HashMap::new();
        for (repo_id, ids) in ids_by_repo {
            for blob in self.blobs.get_parents(&repo_id, &ids).await? {
                fetched.insert(
                    (blob.repo_id.clone(), blob.id.clone()),
                    RetrievedItem {
                        id: blob.id,
                        content: blob.content,
                        repo_id: blob.repo_id,
                        metadata: blob.metadata,
                    },
                );
            }
        }

        Ok(parent_order
            .into_iter()
            .filter_map(|key| fetched.remove(&key))
            .collect())
    }

    /// Chunk mode: search `k` children directly, dropping empty-content hits
    ///
    /// # Errors
    ///
    /// Propagates vector search failures.
    #[tracing::instrument(skip(self, query_vector, filter), fields(k))]
    pub async fn retrieve_chunks(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filter: Option<&Filter>,
    ) -> SearchResult<Vec<RetrievedItem>> {
        let hits = self.vectors.similarity_search(query_vector, k, filter).await?;

        Ok(hits
            .into_iter()
            .filter(|hit| !hit.content.is_empty())
            .map(|hit| {
                let repo_id = hit_repo_id(&hit);
                RetrievedItem {
                    id: hit.id,
                    content: hit.content,
                    repo_id,
                    metadata: hit.metadata,
                }
            })
            .collect())
    }
}

fn hit_repo_id(hit: &SearchHit) -> String {
    hit.metadata
        .get("repoId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
