//! Vector records, search hits, and filter types

use serde::{Deserialize, Serialize};
use uuid::{Uuid, uuid};

/// Namespace UUID for rephole point ids (randomly generated once)
///
/// Keeps our deterministic UUIDs from colliding with other systems.
const REPHOLE_NAMESPACE: Uuid = uuid!("c47d1f6e-3a8b-4e2d-b5f9-8c1e6a2d4b7f");

/// Flat mapping of primitives; zero keys = no filter, one key = equality,
/// two or more = conjunction over all equalities
pub type Filter = serde_json::Map<String, serde_json::Value>;

/// Derive the vector store point id for a chunk
///
/// Point ids must be UUIDs, and chunk ids repeat across repositories that
/// share file layouts, so the id is scoped by the repo filter key.
pub fn point_id(repo_id: &str, chunk_id: &str) -> Uuid {
    let data = format!("{repo_id}:{chunk_id}");
    Uuid::new_v5(&REPHOLE_NAMESPACE, data.as_bytes())
}

/// One indexed chunk: embedding, exact text, and queryable metadata
///
/// `metadata` carries the reserved keys (`id`, `repoId`, `parentId`,
/// `filePath`, ...) plus any caller-supplied primitives that survived
/// sanitization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Canonical chunk id (`{filePath}:{name}:{nodeType}:L{startLine}`)
    pub id: String,
    /// Dense embedding, dimension fixed per embedding model
    pub vector: Vec<f32>,
    /// Exact text of the chunk
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VectorRecord {
    /// The repo filter key this record belongs to (from metadata)
    pub fn repo_id(&self) -> &str {
        self.metadata
            .get("repoId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }

    /// The deterministic point id for this record
    pub fn point_id(&self) -> Uuid {
        point_id(self.repo_id(), &self.id)
    }
}

/// Reject batches carrying the same chunk id twice
///
/// Guards against chunker regressions and metadata collisions before
/// anything reaches the index.
///
/// # Errors
///
/// Returns `DuplicateChunkIds` listing every offending id.
pub fn validate_unique_ids(records: &[VectorRecord]) -> crate::VectorDataResult<()> {
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for record in records {
        if !seen.insert(record.id.as_str()) {
            duplicates.push(record.id.clone());
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(crate::VectorDataError::DuplicateChunkIds(duplicates))
    }
}

/// A search or lookup result from the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Canonical chunk id
    pub id: String,
    /// Exact text of the chunk
    pub content: String,
    /// Similarity in [0, 1], descending across a result list
    pub similarity: f32,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SearchHit {
    /// The `parentId` metadata value, when present and non-empty
    pub fn parent_id(&self) -> Option<&str> {
        self.metadata
            .get("parentId")
            .and_then(serde_json::Value::as_str)
            .filter(|p| !p.is_empty())
    }
}
