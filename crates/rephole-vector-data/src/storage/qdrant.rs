//! Qdrant vector database storage backend
//!
//! Stores one point per code chunk: the embedding as the vector, the chunk
//! text and the full metadata mapping as payload. Point ids are the
//! deterministic UUIDs from [`crate::record::point_id`], so re-upserting a
//! chunk replaces its previous point.

use crate::record::{Filter, SearchHit, VectorRecord, point_id, validate_unique_ids};
use crate::storage::traits::VectorStorage;
use crate::{VectorDataError, VectorDataResult};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CollectionExistsRequest, Condition, CreateCollection, DeletePoints, Distance, GetPoints,
    PointId, PointStruct, PointsIdsList, PointsSelector, Range, ScrollPoints, SearchPoints,
    UpsertPoints, Value, VectorParams, points_selector::PointsSelectorOneOf,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;

/// Vector database client for storing and searching chunk embeddings
#[derive(Clone)]
pub struct QdrantStorage {
    client: std::sync::Arc<Qdrant>,
    collection_name: String,
    dimension: u64,
    batch_size: usize,
}

impl QdrantStorage {
    /// Connect to Qdrant and make sure the collection exists
    ///
    /// Bootstrap is idempotent: an existing collection is reused, and losing
    /// a concurrent-create race is treated as success. The handle is cached
    /// in the returned instance for all further calls.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the server is unreachable or collection
    /// creation fails for a reason other than already-exists.
    pub async fn connect(
        url: &str,
        collection_name: &str,
        dimension: usize,
        batch_size: usize,
    ) -> VectorDataResult<Self> {
        let mut builder = Qdrant::from_url(url);

        // If QDRANT_API_KEY is set, use it for authentication
        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(api_key);
        }

        let client = builder.build().map_err(|e| {
            VectorDataError::Storage(format!("Failed to create Qdrant client: {e}"))
        })?;

        let storage = Self {
            client: std::sync::Arc::new(client),
            collection_name: collection_name.to_string(),
            dimension: dimension as u64,
            batch_size: batch_size.max(1),
        };

        storage.ensure_collection().await?;

        Ok(storage)
    }

    async fn collection_exists(&self) -> VectorDataResult<bool> {
        let request = CollectionExistsRequest {
            collection_name: self.collection_name.clone(),
        };

        self.client
            .collection_exists(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to check collection: {e}")))
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let request = CreateCollection {
            collection_name: self.collection_name.clone(),
            vectors_config: Some(
                VectorParams {
                    size: self.dimension,
                    distance: Distance::Cosine as i32,
                    ..Default::default()
                }
                .into(),
            ),
            ..Default::default()
        };

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Race: another process created it between the check and now
                if e.to_string().contains("already exists") {
                    Ok(())
                } else {
                    Err(VectorDataError::Storage(format!(
                        "Failed to create collection '{}': {e}",
                        self.collection_name
                    )))
                }
            }
        }
    }

    fn hits_from_points(
        points: impl IntoIterator<Item = (HashMap<String, Value>, f32)>,
    ) -> VectorDataResult<Vec<SearchHit>> {
        points
            .into_iter()
            .map(|(payload, similarity)| hit_from_payload(payload, similarity))
            .collect()
    }
}

#[async_trait]
impl VectorStorage for QdrantStorage {
    #[tracing::instrument(skip(self, records), fields(count = records.len(), collection = %self.collection_name))]
    async fn upsert(&self, records: &[VectorRecord]) -> VectorDataResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        validate_unique_ids(records)?;

        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                let mut payload: HashMap<String, Value> = record
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), json_to_qdrant(v)))
                    .collect();
                payload.insert("content".to_string(), Value::from(record.content.clone()));

                PointStruct::new(
                    record.point_id().to_string(),
                    record.vector.clone(),
                    Payload::from(payload),
                )
            })
            .collect();

        for slice in points.chunks(self.batch_size) {
            let request = UpsertPoints {
                collection_name: self.collection_name.clone(),
                points: slice.to_vec(),
                ..Default::default()
            };

            self.client
                .upsert_points(request)
                .await
                .map_err(|e| VectorDataError::Storage(format!("Upsert failed: {e}")))?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, vector, filter), fields(query_dim = vector.len(), k))]
    async fn similarity_search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<&Filter>,
    ) -> VectorDataResult<Vec<SearchHit>> {
        let request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector,
            limit: k as u64,
            with_payload: Some(true.into()),
            filter: filter.map(to_qdrant_filter),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Search failed: {e}")))?;

        response
            .result
            .into_iter()
            .map(|scored| {
                if !scored.score.is_finite() {
                    return Err(VectorDataError::MalformedResult(
                        "search hit without a usable distance".into(),
                    ));
                }
                // Cosine scoring already reports a similarity, so the
                // distance-to-similarity normalization is the identity here.
                hit_from_payload(scored.payload, scored.score.clamp(0.0, 1.0))
            })
            .collect()
    }

    async fn get_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<Vec<SearchHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_id(repo_id, id).to_string()))
            .collect();

        let request = GetPoints {
            collection_name: self.collection_name.clone(),
            ids: point_ids,
            with_payload: Some(true.into()),
            ..Default::default()
        };

        let response = self
            .client
            .get_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Get by ids failed: {e}")))?;

        Self::hits_from_points(response.result.into_iter().map(|p| (p.payload, 1.0)))
    }

    async fn get_by_file_path(
        &self,
        repo_id: &str,
        path: &str,
    ) -> VectorDataResult<Vec<SearchHit>> {
        let mut filter = Filter::new();
        filter.insert("repoId".into(), serde_json::Value::String(repo_id.into()));
        filter.insert("filePath".into(), serde_json::Value::String(path.into()));

        let mut hits = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let request = ScrollPoints {
                collection_name: self.collection_name.clone(),
                filter: Some(to_qdrant_filter(&filter)),
                limit: Some(1000),
                with_payload: Some(true.into()),
                offset: offset.clone(),
                ..Default::default()
            };

            let response = self
                .client
                .scroll(request)
                .await
                .map_err(|e| VectorDataError::Storage(format!("Scroll failed: {e}")))?;

            hits.extend(Self::hits_from_points(
                response.result.into_iter().map(|p| (p.payload, 1.0)),
            )?);

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(hits)
    }

    async fn delete_by_ids(&self, repo_id: &str, ids: &[String]) -> VectorDataResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_id(repo_id, id).to_string()))
            .collect();

        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                    ids: point_ids,
                })),
            }),
            ..Default::default()
        };

        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Delete by ids failed: {e}")))?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(filter = ?filter))]
    async fn delete_by_filter(&self, filter: &Filter) -> VectorDataResult<()> {
        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(to_qdrant_filter(
                    filter,
                ))),
            }),
            ..Default::default()
        };

        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Delete by filter failed: {e}")))?;

        Ok(())
    }
}

/// Translate the flat filter into Qdrant's predicate form
///
/// Zero keys would mean "no filter" and is never passed here; one key is a
/// single equality; several keys become a must-conjunction.
fn to_qdrant_filter(filter: &Filter) -> qdrant_client::qdrant::Filter {
    let conditions: Vec<Condition> = filter
        .iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some(Condition::matches(key.clone(), s.clone())),
            serde_json::Value::Bool(b) => Some(Condition::matches(key.clone(), *b)),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || {
                    // Exact double matching is expressed as a degenerate range
                    n.as_f64().map(|f| {
                        Condition::range(
                            key.clone(),
                            Range {
                                gte: Some(f),
                                lte: Some(f),
                                ..Default::default()
                            },
                        )
                    })
                },
                |i| Some(Condition::matches(key.clone(), i)),
            ),
            _ => {
                tracing::warn!(key, "Dropping non-primitive filter value");
                None
            }
        })
        .collect();

    qdrant_client::qdrant::Filter::must(conditions)
}

fn hit_from_payload(
    mut payload: HashMap<String, Value>,
    similarity: f32,
) -> VectorDataResult<SearchHit> {
    let content = payload
        .remove("content")
        .map(|v| qdrant_to_json(&v))
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_default();

    let metadata: serde_json::Map<String, serde_json::Value> = payload
        .iter()
        .map(|(k, v)| (k.clone(), qdrant_to_json(v)))
        .collect();

    let id = metadata
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| VectorDataError::MalformedResult("hit payload missing chunk id".into()))?
        .to_string();

    Ok(SearchHit {
        id,
        content,
        similarity,
        metadata,
    })
}

fn json_to_qdrant(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => Value::from(s.clone()),
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::from(n.as_f64().unwrap_or(0.0)), Value::from),
        // Non-primitives are filtered out before records are built; store
        // anything that slips through as its JSON text
        other => Value::from(other.to_string()),
    }
}

fn qdrant_to_json(value: &Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;

    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        _ => serde_json::Value::Null,
    }
}
