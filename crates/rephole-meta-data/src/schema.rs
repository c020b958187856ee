//! Embedded schema bootstrap
//!
//! rephole ships one idempotent schema file instead of a migration chain:
//! every statement is `CREATE ... IF NOT EXISTS`, so replaying the whole
//! file on startup converges and no version bookkeeping table is needed.

use anyhow::{Context, Result};
use sqlx::PgPool;

const SCHEMA: &str = include_str!("../schema.sql");

/// Serializes concurrent bootstrappers (API and worker start together)
const SCHEMA_LOCK_ID: i64 = 0x7265_7068;

/// Apply the embedded schema
///
/// Runs inside a single transaction holding a transaction-scoped advisory
/// lock, so the lock can never leak: whichever way the transaction ends,
/// Postgres releases it. Losers of the race re-run the same DDL and no-op.
///
/// # Errors
///
/// Returns an error when the lock cannot be taken or a statement fails;
/// the transaction rolls back and nothing is half-applied.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to open schema transaction")?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_ID)
        .execute(&mut *tx)
        .await
        .context("Failed to take schema lock")?;

    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                let head = statement.lines().next().unwrap_or(statement);
                format!("Schema statement failed: {head}")
            })?;
    }

    tx.commit().await.context("Failed to commit schema")?;

    tracing::debug!("Schema is in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SCHEMA;

    #[test]
    fn every_schema_statement_is_idempotent() {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let lowered = statement.to_lowercase();
            assert!(
                lowered.contains("if not exists"),
                "statement is not replay-safe: {}",
                statement.lines().next().unwrap_or(statement)
            );
        }
    }

    #[test]
    fn schema_covers_all_three_stores() {
        for table in ["repositories", "content_blobs", "ingestion_jobs"] {
            assert!(SCHEMA.contains(table), "schema missing table {table}");
        }
    }
}
