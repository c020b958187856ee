//! Storage abstraction trait for vector databases
//!
//! Abstracts the vector index so the pipeline can run against Qdrant in
//! production and an in-memory implementation in tests.

use crate::record::{Filter, SearchHit, VectorRecord};
use crate::VectorDataResult;
use async_trait::async_trait;

/// Trait for vector storage backends
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// Upsert a batch of records
    ///
    /// Validates that chunk ids are pairwise unique across the batch
    /// (`DuplicateChunkIds` otherwise), then writes in slices of at most the
    /// configured batch size. Upserting the same ids again replaces the old
    /// points; this is what makes job replays converge.
    async fn upsert(&self, records: &[VectorRecord]) -> VectorDataResult<()>;

    /// Approximate-nearest-neighbor search
    ///
    /// The filter is a conjunction of equalities over metadata fields.
    /// Results come back similarity-descending, scores in [0, 1].
    async fn similarity_search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<&Filter>,
    ) -> VectorDataResult<Vec<SearchHit>>;

    /// Fetch records by chunk id within one repository
    async fn get_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<Vec<SearchHit>>;

    /// All records indexed for one file of one repository
    async fn get_by_file_path(&self, repo_id: &str, path: &str)
    -> VectorDataResult<Vec<SearchHit>>;

    /// Delete records by chunk id within one repository
    async fn delete_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<()>;

    /// Delete every record matching the filter (e.g. `{repoId, parentId}`
    /// when a file disappears)
    async fn delete_by_filter(&self, filter: &Filter) -> VectorDataResult<()>;
}
