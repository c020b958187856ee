//! Database connection setup

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::schema::ensure_schema;
use rephole_config::DatabaseConfig;

/// Connect to Postgres and make sure the schema is in place
///
/// Pool sizing and timeouts come from the configuration; schema bootstrap
/// can be switched off (`POSTGRES_AUTO_MIGRATE=false`) for deployments that
/// manage DDL externally.
///
/// # Errors
///
/// Returns an error when the server is unreachable, credentials are
/// rejected, or schema bootstrap fails.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = config.create_pool().await.with_context(|| {
        format!(
            "Failed to connect to {}",
            config.safe_connection_string()
        )
    })?;

    if config.auto_migrate {
        ensure_schema(&pool).await?;
    }

    Ok(pool)
}
