//! Database error types with operation context

use thiserror::Error;

/// Errors raised by the PostgreSQL-backed stores
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database operation '{operation}' failed: {source}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization failed for {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Specialized Result type for database operations
pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;

/// Extension trait to attach the failing operation to sqlx errors
pub trait DatabaseErrorExt<T> {
    /// Map an sqlx error into [`DatabaseError::Query`] tagged with `operation`
    fn map_db_err(self, operation: &str) -> DatabaseResult<T>;
}

impl<T> DatabaseErrorExt<T> for Result<T, sqlx::Error> {
    fn map_db_err(self, operation: &str) -> DatabaseResult<T> {
        self.map_err(|source| DatabaseError::Query {
            operation: operation.to_string(),
            source,
        })
    }
}
