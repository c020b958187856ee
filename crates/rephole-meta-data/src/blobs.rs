//! Content blob store: full file bodies keyed by (repo, path)

use crate::error::{DatabaseErrorExt, DatabaseResult};
use crate::models::ContentBlob;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// Strip bytes Postgres TEXT cannot hold: U+0000 and C0 controls other than
/// line feed, carriage return, and tab.
///
/// Returns the cleaned string and how many characters were removed.
/// Sanitizing already-sanitized content is a no-op.
pub fn sanitize_content(input: &str) -> (String, usize) {
    let mut stripped = 0usize;
    let cleaned: String = input
        .chars()
        .filter(|&c| {
            let keep = (c as u32) >= 0x20 || matches!(c, '\n' | '\r' | '\t');
            if !keep {
                stripped += 1;
            }
            keep
        })
        .collect();
    (cleaned, stripped)
}

/// Persistence of parent file bodies for parent-child retrieval
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upsert a file body. Content is sanitized before the write; stripped
    /// characters are counted and logged, never an error.
    async fn save_parent(
        &self,
        repo_id: &str,
        id: &str,
        content: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> DatabaseResult<()>;

    /// Fetch one blob
    async fn get_parent(&self, repo_id: &str, id: &str) -> DatabaseResult<Option<ContentBlob>>;

    /// Fetch a batch of blobs; missing ids are silently omitted and order is
    /// unspecified (the retriever re-orders)
    async fn get_parents(&self, repo_id: &str, ids: &[String]) -> DatabaseResult<Vec<ContentBlob>>;
}

/// PostgreSQL-backed blob store
#[derive(Clone)]
pub struct PgBlobStore {
    pool: PgPool,
}

impl PgBlobStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobStore for PgBlobStore {
    #[tracing::instrument(skip(self, content, metadata), fields(repo_id, id))]
    async fn save_parent(
        &self,
        repo_id: &str,
        id: &str,
        content: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> DatabaseResult<()> {
        let (cleaned, stripped) = sanitize_content(content);
        if stripped > 0 {
            tracing::info!(repo_id, id, stripped, "Sanitized control characters out of blob");
        }

        sqlx::query(
            r"
            INSERT INTO content_blobs (repo_id, id, content, metadata, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (repo_id, id) DO UPDATE
            SET content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            ",
        )
        .bind(repo_id)
        .bind(id)
        .bind(cleaned)
        .bind(serde_json::Value::Object(metadata.clone()))
        .execute(&self.pool)
        .await
        .map_db_err("save_parent")?;

        Ok(())
    }

    async fn get_parent(&self, repo_id: &str, id: &str) -> DatabaseResult<Option<ContentBlob>> {
        let row = sqlx::query(
            "SELECT repo_id, id, content, metadata FROM content_blobs WHERE repo_id = $1 AND id = $2",
        )
        .bind(repo_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("get_parent")?;

        Ok(row.map(|r| blob_from_row(&r)))
    }

    async fn get_parents(&self, repo_id: &str, ids: &[String]) -> DatabaseResult<Vec<ContentBlob>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT repo_id, id, content, metadata FROM content_blobs WHERE repo_id = $1 AND id = ANY($2)",
        )
        .bind(repo_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_db_err("get_parents")?;

        Ok(rows.iter().map(blob_from_row).collect())
    }
}

fn blob_from_row(row: &sqlx::postgres::PgRow) -> ContentBlob {
    let metadata: serde_json::Value = row.get("metadata");
    ContentBlob {
        repo_id: row.get("repo_id"),
        id: row.get("id"),
        content: row.get("content"),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
    }
}
