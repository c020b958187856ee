//! Durable per-repository processing state

use crate::error::{DatabaseErrorExt, DatabaseResult};
use crate::models::RepoState;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

/// CRUD over the repository-state records
///
/// `find_by_url` is the hot path: every job resolves its state by URL.
#[async_trait]
pub trait RepoStateStore: Send + Sync {
    async fn find_by_url(&self, repo_url: &str) -> DatabaseResult<Option<RepoState>>;

    async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<RepoState>>;

    /// Upsert on id; last writer wins on `last_processed_commit`
    async fn save(&self, state: &RepoState) -> DatabaseResult<()>;
}

/// PostgreSQL-backed repo state store
#[derive(Clone)]
pub struct PgRepoStateStore {
    pool: PgPool,
}

impl PgRepoStateStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepoStateStore for PgRepoStateStore {
    async fn find_by_url(&self, repo_url: &str) -> DatabaseResult<Option<RepoState>> {
        let row = sqlx::query(
            r"
            SELECT id, repo_url, local_path, last_processed_commit, file_signatures,
                   created_at, updated_at
            FROM repositories WHERE repo_url = $1
            ",
        )
        .bind(repo_url)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("find_repo_by_url")?;

        Ok(row.map(|r| state_from_row(&r)))
    }

    async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<RepoState>> {
        let row = sqlx::query(
            r"
            SELECT id, repo_url, local_path, last_processed_commit, file_signatures,
                   created_at, updated_at
            FROM repositories WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("find_repo_by_id")?;

        Ok(row.map(|r| state_from_row(&r)))
    }

    #[tracing::instrument(skip(self, state), fields(id = %state.id, repo_url = %state.repo_url))]
    async fn save(&self, state: &RepoState) -> DatabaseResult<()> {
        let signatures =
            serde_json::to_value(&state.file_signatures).unwrap_or(serde_json::Value::Null);

        sqlx::query(
            r"
            INSERT INTO repositories
                (id, repo_url, local_path, last_processed_commit, file_signatures,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE
            SET repo_url = EXCLUDED.repo_url,
                local_path = EXCLUDED.local_path,
                last_processed_commit = EXCLUDED.last_processed_commit,
                file_signatures = EXCLUDED.file_signatures,
                updated_at = NOW()
            ",
        )
        .bind(&state.id)
        .bind(&state.repo_url)
        .bind(&state.local_path)
        .bind(&state.last_processed_commit)
        .bind(signatures)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_db_err("save_repo_state")?;

        Ok(())
    }
}

fn state_from_row(row: &sqlx::postgres::PgRow) -> RepoState {
    let signatures: serde_json::Value = row.get("file_signatures");
    let file_signatures: HashMap<String, String> =
        serde_json::from_value(signatures).unwrap_or_default();

    RepoState {
        id: row.get("id"),
        repo_url: row.get("repo_url"),
        local_path: row.get("local_path"),
        last_processed_commit: row.get("last_processed_commit"),
        file_signatures,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
