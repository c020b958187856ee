//! In-memory vector storage for tests
//!
//! Brute-force cosine similarity over a HashMap of points. Filter semantics
//! match the Qdrant adapter: conjunction of equalities over metadata.

use crate::record::{Filter, SearchHit, VectorRecord, validate_unique_ids};
use crate::storage::traits::VectorStorage;
use crate::{VectorDataError, VectorDataResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory implementation of [`VectorStorage`]
#[derive(Default)]
pub struct MockVectorStorage {
    points: Mutex<HashMap<Uuid, VectorRecord>>,
}

impl MockVectorStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points currently stored (for assertions)
    pub fn len(&self) -> usize {
        self.points.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all stored records (for assertions)
    pub fn records(&self) -> Vec<VectorRecord> {
        self.points
            .lock()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> VectorDataResult<std::sync::MutexGuard<'_, HashMap<Uuid, VectorRecord>>> {
        self.points
            .lock()
            .map_err(|_| VectorDataError::Other("mock storage lock poisoned".into()))
    }
}

fn matches_filter(record: &VectorRecord, filter: Option<&Filter>) -> bool {
    filter.is_none_or(|f| {
        f.iter()
            .all(|(key, expected)| record.metadata.get(key) == Some(expected))
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn hit(record: &VectorRecord, similarity: f32) -> SearchHit {
    SearchHit {
        id: record.id.clone(),
        content: record.content.clone(),
        similarity,
        metadata: record.metadata.clone(),
    }
}

#[async_trait]
impl VectorStorage for MockVectorStorage {
    async fn upsert(&self, records: &[VectorRecord]) -> VectorDataResult<()> {
        validate_unique_ids(records)?;
        let mut points = self.lock()?;
        for record in records {
            points.insert(record.point_id(), record.clone());
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<&Filter>,
    ) -> VectorDataResult<Vec<SearchHit>> {
        let points = self.lock()?;
        let mut scored: Vec<SearchHit> = points
            .values()
            .filter(|record| matches_filter(record, filter))
            .map(|record| {
                hit(
                    record,
                    cosine_similarity(&vector, &record.vector).clamp(0.0, 1.0),
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<Vec<SearchHit>> {
        let points = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| points.get(&crate::record::point_id(repo_id, id)))
            .map(|record| hit(record, 1.0))
            .collect())
    }

    async fn get_by_file_path(
        &self,
        repo_id: &str,
        path: &str,
    ) -> VectorDataResult<Vec<SearchHit>> {
        let mut filter = Filter::new();
        filter.insert("repoId".into(), serde_json::Value::String(repo_id.into()));
        filter.insert("filePath".into(), serde_json::Value::String(path.into()));

        let points = self.lock()?;
        Ok(points
            .values()
            .filter(|record| matches_filter(record, Some(&filter)))
            .map(|record| hit(record, 1.0))
            .collect())
    }

    async fn delete_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<()> {
        let mut points = self.lock()?;
        for id in ids {
            points.remove(&crate::record::point_id(repo_id, id));
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> VectorDataResult<()> {
        let mut points = self.lock()?;
        points.retain(|_, record| !matches_filter(record, Some(filter)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, repo_id: &str, parent: &str, vector: Vec<f32>) -> VectorRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("id".into(), serde_json::Value::String(id.into()));
        metadata.insert("repoId".into(), serde_json::Value::String(repo_id.into()));
        metadata.insert("parentId".into(), serde_json::Value::String(parent.into()));
        metadata.insert("filePath".into(), serde_json::Value::String(parent.into()));
        VectorRecord {
            id: id.into(),
            vector,
            content: format!("content of {id}"),
            metadata,
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_honors_filter() {
        let storage = MockVectorStorage::new();
        storage
            .upsert(&[
                record("a:f:fn:L1", "demo", "a.rs", vec![1.0, 0.0]),
                record("b:g:fn:L1", "demo", "b.rs", vec![0.6, 0.8]),
                record("c:h:fn:L1", "other", "c.rs", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let mut filter = Filter::new();
        filter.insert("repoId".into(), serde_json::Value::String("demo".into()));

        let hits = storage
            .similarity_search(vec![1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a:f:fn:L1");
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn upsert_replaces_points_with_same_id() {
        let storage = MockVectorStorage::new();
        storage
            .upsert(&[record("a:f:fn:L1", "demo", "a.rs", vec![1.0, 0.0])])
            .await
            .unwrap();
        storage
            .upsert(&[record("a:f:fn:L1", "demo", "a.rs", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching_points_only() {
        let storage = MockVectorStorage::new();
        storage
            .upsert(&[
                record("a:f:fn:L1", "demo", "src/a.rs", vec![1.0, 0.0]),
                record("b:g:fn:L1", "demo", "src/b.rs", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let mut filter = Filter::new();
        filter.insert("repoId".into(), serde_json::Value::String("demo".into()));
        filter.insert("parentId".into(), serde_json::Value::String("src/b.rs".into()));
        storage.delete_by_filter(&filter).await.unwrap();

        assert_eq!(storage.len(), 1);
        let remaining = storage.records();
        assert_eq!(remaining[0].id, "a:f:fn:L1");
    }

    #[tokio::test]
    async fn get_by_file_path_scopes_to_repo() {
        let storage = MockVectorStorage::new();
        storage
            .upsert(&[
                record("a:f:fn:L1", "demo", "src/a.rs", vec![1.0, 0.0]),
                record("a:f:fn:L1", "other", "src/a.rs", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        // Same chunk id in two repos stays two distinct points
        assert_eq!(storage.len(), 2);

        let hits = storage.get_by_file_path("demo", "src/a.rs").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].metadata.get("repoId").and_then(|v| v.as_str()),
            Some("demo")
        );
    }
}
