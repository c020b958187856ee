//! PostgreSQL-backed durable ingestion job queue
//!
//! At-least-once delivery using the SKIP LOCKED claim pattern: producers
//! insert jobs, workers claim one at a time, failures requeue with
//! exponential backoff until `max_attempts`, then park as failed for
//! inspection and manual retry.

use crate::error::{DatabaseError, DatabaseErrorExt, DatabaseResult};
use crate::models::{Job, JobPayload, JobState};
use async_trait::async_trait;
use rephole_config::QueueConfig;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Durable queue operations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a new waiting job, returning it
    async fn enqueue(&self, payload: &JobPayload) -> DatabaseResult<Job>;

    /// Claim the oldest visible waiting job (SKIP LOCKED), marking it active
    /// and bumping its attempt counter. Returns None when the queue is empty.
    async fn claim(&self, worker_id: &str) -> DatabaseResult<Option<Job>>;

    /// Mark a job completed
    async fn complete(&self, id: Uuid) -> DatabaseResult<()>;

    /// Record a failure: requeue with exponential backoff while attempts
    /// remain, otherwise park as failed
    async fn fail(&self, id: Uuid, reason: &str) -> DatabaseResult<()>;

    /// Update job progress (clamped to 0..=100)
    async fn set_progress(&self, id: Uuid, progress: i32) -> DatabaseResult<()>;

    /// Fetch one job
    async fn get(&self, id: Uuid) -> DatabaseResult<Option<Job>>;

    /// All parked-failed jobs, most recent first
    async fn list_failed(&self) -> DatabaseResult<Vec<Job>>;

    /// Re-enqueue one failed job; false when the id is not a failed job
    async fn retry(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Re-enqueue every failed job, returning how many
    async fn retry_all(&self) -> DatabaseResult<u64>;

    /// Apply the retention policy, returning how many jobs were swept
    async fn sweep(&self) -> DatabaseResult<u64>;
}

/// PostgreSQL implementation of the job queue
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    config: QueueConfig,
}

impl PgJobQueue {
    pub const fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[tracing::instrument(skip(self, payload), fields(repo_url = %payload.repo_url, repo_id = %payload.repo_id))]
    async fn enqueue(&self, payload: &JobPayload) -> DatabaseResult<Job> {
        let id = Uuid::new_v4();
        let payload_json =
            serde_json::to_value(payload).map_err(|source| DatabaseError::Serialization {
                context: "job payload".into(),
                source,
            })?;

        sqlx::query(
            r"
            INSERT INTO ingestion_jobs (id, payload, status, max_attempts, queued_at)
            VALUES ($1, $2, 'waiting', $3, $4)
            ",
        )
        .bind(id)
        .bind(&payload_json)
        .bind(self.config.max_attempts)
        .bind(payload.queued_at)
        .execute(&self.pool)
        .await
        .map_db_err("enqueue_job")?;

        Ok(Job {
            id,
            payload: payload.clone(),
            state: JobState::Waiting,
            progress: 0,
            attempts: 0,
            max_attempts: self.config.max_attempts,
            failed_reason: None,
            claimed_by: None,
            queued_at: payload.queued_at,
            started_at: None,
            finished_at: None,
        })
    }

    async fn claim(&self, worker_id: &str) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(
            r"
            WITH claimed AS (
                SELECT id FROM ingestion_jobs
                WHERE status = 'waiting'
                  AND (visible_after IS NULL OR visible_after <= NOW())
                ORDER BY queued_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE ingestion_jobs j
            SET status = 'active',
                attempts = j.attempts + 1,
                started_at = NOW(),
                claimed_by = $1
            FROM claimed
            WHERE j.id = claimed.id
            RETURNING j.id, j.payload, j.status, j.progress, j.attempts, j.max_attempts,
                      j.failed_reason, j.claimed_by, j.queued_at, j.started_at, j.finished_at
            ",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("claim_job")?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn complete(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'completed', progress = 100, finished_at = NOW(), claimed_by = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_db_err("complete_job")?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(job_id = %id))]
    async fn fail(&self, id: Uuid, reason: &str) -> DatabaseResult<()> {
        // Backoff doubles per attempt: base, 2*base, 4*base, ...
        sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'waiting' END,
                failed_reason = $2,
                visible_after = CASE WHEN attempts >= max_attempts THEN NULL
                    ELSE NOW() + make_interval(secs => $3 * power(2, attempts - 1)) END,
                finished_at = CASE WHEN attempts >= max_attempts THEN NOW() ELSE NULL END,
                claimed_by = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(reason)
        .bind(self.config.backoff_base_secs as f64)
        .execute(&self.pool)
        .await
        .map_db_err("fail_job")?;
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> DatabaseResult<()> {
        sqlx::query("UPDATE ingestion_jobs SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(progress.clamp(0, 100))
            .execute(&self.pool)
            .await
            .map_db_err("set_job_progress")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        let row = sqlx::query(
            r"
            SELECT id, payload, status, progress, attempts, max_attempts,
                   failed_reason, claimed_by, queued_at, started_at, finished_at
            FROM ingestion_jobs WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("get_job")?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn list_failed(&self) -> DatabaseResult<Vec<Job>> {
        let rows = sqlx::query(
            r"
            SELECT id, payload, status, progress, attempts, max_attempts,
                   failed_reason, claimed_by, queued_at, started_at, finished_at
            FROM ingestion_jobs WHERE status = 'failed'
            ORDER BY finished_at DESC NULLS LAST
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_db_err("list_failed_jobs")?;

        rows.iter().map(job_from_row).collect()
    }

    async fn retry(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'waiting', attempts = 0, visible_after = NULL,
                failed_reason = NULL, finished_at = NULL
            WHERE id = $1 AND status = 'failed'
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_db_err("retry_job")?;

        Ok(result.rows_affected() > 0)
    }

    async fn retry_all(&self) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = 'waiting', attempts = 0, visible_after = NULL,
                failed_reason = NULL, finished_at = NULL
            WHERE status = 'failed'
            ",
        )
        .execute(&self.pool)
        .await
        .map_db_err("retry_all_jobs")?;

        Ok(result.rows_affected())
    }

    async fn sweep(&self) -> DatabaseResult<u64> {
        let mut swept = 0u64;

        let aged_completed = sqlx::query(
            r"
            DELETE FROM ingestion_jobs
            WHERE status = 'completed'
              AND finished_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(self.config.completed_retention_secs as f64)
        .execute(&self.pool)
        .await
        .map_db_err("sweep_completed_by_age")?;
        swept += aged_completed.rows_affected();

        let excess_completed = sqlx::query(
            r"
            DELETE FROM ingestion_jobs
            WHERE status = 'completed' AND id NOT IN (
                SELECT id FROM ingestion_jobs
                WHERE status = 'completed'
                ORDER BY finished_at DESC NULLS LAST
                LIMIT $1
            )
            ",
        )
        .bind(self.config.completed_retention_count)
        .execute(&self.pool)
        .await
        .map_db_err("sweep_completed_by_count")?;
        swept += excess_completed.rows_affected();

        let aged_failed = sqlx::query(
            r"
            DELETE FROM ingestion_jobs
            WHERE status = 'failed'
              AND finished_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(self.config.failed_retention_secs as f64)
        .execute(&self.pool)
        .await
        .map_db_err("sweep_failed_by_age")?;
        swept += aged_failed.rows_affected();

        Ok(swept)
    }
}

fn job_from_row(row: &PgRow) -> DatabaseResult<Job> {
    let payload_json: serde_json::Value = row.get("payload");
    let payload: JobPayload =
        serde_json::from_value(payload_json).map_err(|source| DatabaseError::Serialization {
            context: "job payload".into(),
            source,
        })?;

    let status: String = row.get("status");

    Ok(Job {
        id: row.get("id"),
        payload,
        state: status.parse().unwrap_or(JobState::Waiting),
        progress: row.get("progress"),
        attempts: row.get("attempts"),
        max_attempts: row.get("max_attempts"),
        failed_reason: row.get("failed_reason"),
        claimed_by: row.get("claimed_by"),
        queued_at: row.get("queued_at"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    })
}
