//! Centralized configuration management for rephole
//!
//! This crate provides a unified configuration system that eliminates
//! duplication across the codebase and provides type-safe, validated
//! configuration.
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;

pub use error::{ConfigError, ConfigResult};

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::time::Duration;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Database Configuration (safe local defaults)
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "rephole";
const DEFAULT_DB_USER: &str = "rephole";
const DEFAULT_DB_PASSWORD: &str = "localdev123";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DB_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_AUTO_MIGRATE: bool = true;

// Vector Storage Configuration
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION_NAME: &str = "rephole-collection";
const DEFAULT_VECTOR_BATCH_SIZE: usize = 1000;

// Embedding Configuration
const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_EMBEDDING_MAX_TOKENS: usize = 8000;

// Local repository mirror storage
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./repos";

// HTTP server ports (producer API and worker health endpoint)
const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_WORKER_PORT: u16 = 3002;
const DEFAULT_API_HOST: &str = "0.0.0.0";

// Worker behavior
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MEMORY_WARN_MB: u64 = 2048;

// Job queue policy
const DEFAULT_JOB_MAX_ATTEMPTS: i32 = 3;
const DEFAULT_JOB_BACKOFF_BASE_SECS: i64 = 5;
const DEFAULT_COMPLETED_RETENTION_SECS: i64 = 3600;
const DEFAULT_COMPLETED_RETENTION_COUNT: i64 = 100;
const DEFAULT_FAILED_RETENTION_SECS: i64 = 86_400;

/// Core configuration for the entire rephole application
///
/// All settings have safe defaults and can be overridden via environment
/// variables. The same defaults work for dev, test, and CI.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Database (repo state, blobs, job queue)
    pub database: DatabaseConfig,

    /// Vector storage (Qdrant)
    pub vector_storage: VectorStorageConfig,

    /// Embedding backend
    pub embedding: EmbeddingConfig,

    /// Local clone storage
    pub storage: StorageConfig,

    /// HTTP server configuration
    pub api: ApiConfig,

    /// Worker loop configuration
    pub worker: WorkerConfig,

    /// Job queue retry/retention policy
    pub queue: QueueConfig,
}

impl ApplicationConfig {
    /// Load configuration from environment variables over safe defaults
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            vector_storage: VectorStorageConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            storage: StorageConfig::from_env(),
            api: ApiConfig::from_env(),
            worker: WorkerConfig::from_env(),
            queue: QueueConfig::default(),
        }
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is out of its legal range or a
    /// required secret is absent.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vector_storage.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "VECTOR_STORE_BATCH_SIZE".into(),
                value: "0".into(),
                reason: "batch size must be positive".into(),
            });
        }
        if self.embedding.api_key.is_empty() {
            return Err(ConfigError::Missing("OPENAI_API_KEY".into()));
        }
        Ok(())
    }
}

/// PostgreSQL connection settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            database: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            acquire_timeout_seconds: DEFAULT_DB_TIMEOUT_SECONDS,
            auto_migrate: DEFAULT_AUTO_MIGRATE,
        }
    }
}

impl DatabaseConfig {
    /// Load from `POSTGRES_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("POSTGRES_HOST", defaults.host),
            port: env_parse_or("POSTGRES_PORT", defaults.port),
            database: env_or("POSTGRES_DB", defaults.database),
            user: env_or("POSTGRES_USER", defaults.user),
            password: env_or("POSTGRES_PASSWORD", defaults.password),
            max_connections: env_parse_or("POSTGRES_MAX_CONNECTIONS", defaults.max_connections),
            acquire_timeout_seconds: defaults.acquire_timeout_seconds,
            auto_migrate: env_parse_or("POSTGRES_AUTO_MIGRATE", defaults.auto_migrate),
        }
    }

    /// Connection string with the password redacted, safe for logs
    pub fn safe_connection_string(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// Create a connection pool from this configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the server is unreachable, credentials are
    /// rejected, or the acquire timeout elapses.
    pub async fn create_pool(&self) -> Result<PgPool, sqlx::Error> {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password);

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds))
            .connect_with(options)
            .await
    }
}

/// Qdrant connection and collection settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorStorageConfig {
    pub url: String,
    pub collection_name: String,
    /// Maximum records per upsert slice
    pub batch_size: usize,
    /// Vector dimension, fixed by the embedding model
    pub dimension: usize,
}

impl Default for VectorStorageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            batch_size: DEFAULT_VECTOR_BATCH_SIZE,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl VectorStorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env_or("QDRANT_URL", defaults.url),
            collection_name: env_or("QDRANT_COLLECTION_NAME", defaults.collection_name),
            batch_size: env_parse_or("VECTOR_STORE_BATCH_SIZE", defaults.batch_size),
            dimension: env_parse_or("EMBEDDING_DIMENSION", defaults.dimension),
        }
    }
}

/// Embedding backend settings (OpenAI-compatible HTTP API)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub model: String,
    pub dimension: usize,
    /// Inputs longer than ~4 chars per token over this budget are truncated
    pub max_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            api_key: String::new(),
            organization_id: None,
            project_id: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_tokens: DEFAULT_EMBEDDING_MAX_TOKENS,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("OPENAI_BASE_URL", defaults.base_url),
            api_key: env_or("OPENAI_API_KEY", defaults.api_key),
            organization_id: std::env::var("OPENAI_ORGANIZATION_ID").ok(),
            project_id: std::env::var("OPENAI_PROJECT_ID").ok(),
            model: env_or("OPENAI_EMBEDDING_MODEL", defaults.model),
            dimension: env_parse_or("EMBEDDING_DIMENSION", defaults.dimension),
            max_tokens: env_parse_or("EMBEDDING_MAX_TOKENS", defaults.max_tokens),
        }
    }
}

/// Where working clones live on disk
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StorageConfig {
    pub local_path: std::path::PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: std::path::PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            local_path: std::env::var("LOCAL_STORAGE_PATH")
                .map_or(defaults.local_path, std::path::PathBuf::from),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_API_HOST.to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: env_parse_or("PORT", defaults.port),
        }
    }
}

/// Worker loop settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkerConfig {
    /// Health endpoint port (the worker serves /health only)
    pub port: u16,
    /// How often to poll for new jobs when the queue is empty (milliseconds)
    pub poll_interval_ms: u64,
    /// Whether to sample process RSS and warn above the threshold
    pub memory_monitoring: bool,
    /// RSS warning threshold in megabytes
    pub memory_warn_mb: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_WORKER_PORT,
            poll_interval_ms: DEFAULT_WORKER_POLL_INTERVAL_MS,
            memory_monitoring: false,
            memory_warn_mb: DEFAULT_MEMORY_WARN_MB,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse_or("PORT", defaults.port),
            poll_interval_ms: env_parse_or("WORKER_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            memory_monitoring: env_parse_or("MEMORY_MONITORING", defaults.memory_monitoring),
            memory_warn_mb: env_parse_or("MEMORY_WARN_MB", defaults.memory_warn_mb),
        }
    }
}

/// Job queue retry and retention policy
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueConfig {
    /// Attempts before a job is parked as failed
    pub max_attempts: i32,
    /// First retry delay; doubles on each subsequent attempt
    pub backoff_base_secs: i64,
    /// Completed jobs older than this are swept
    pub completed_retention_secs: i64,
    /// At most this many completed jobs are kept regardless of age
    pub completed_retention_count: i64,
    /// Failed jobs older than this are swept
    pub failed_retention_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_JOB_MAX_ATTEMPTS,
            backoff_base_secs: DEFAULT_JOB_BACKOFF_BASE_SECS,
            completed_retention_secs: DEFAULT_COMPLETED_RETENTION_SECS,
            completed_retention_count: DEFAULT_COMPLETED_RETENTION_COUNT,
            failed_retention_secs: DEFAULT_FAILED_RETENTION_SECS,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ApplicationConfig {
            database: DatabaseConfig::default(),
            vector_storage: VectorStorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            worker: WorkerConfig::default(),
            queue: QueueConfig::default(),
        };

        assert_eq!(config.vector_storage.collection_name, "rephole-collection");
        assert_eq!(config.vector_storage.batch_size, 1000);
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.worker.port, 3002);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff_base_secs, 5);
    }

    #[test]
    fn connection_string_redacts_password() {
        let db = DatabaseConfig::default();
        let s = db.safe_connection_string();
        assert!(s.contains("***"));
        assert!(!s.contains(&db.password));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = ApplicationConfig {
            database: DatabaseConfig::default(),
            vector_storage: VectorStorageConfig::default(),
            embedding: EmbeddingConfig {
                api_key: "sk-test".into(),
                ..EmbeddingConfig::default()
            },
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            worker: WorkerConfig::default(),
            queue: QueueConfig::default(),
        };
        assert!(config.validate().is_ok());

        config.vector_storage.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
