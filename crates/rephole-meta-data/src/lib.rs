//! Durable state for rephole: repository records, content blobs, the
//! ingestion job queue, and the git working-clone mirror.
//!
//! Everything except the git mirror is backed by PostgreSQL. In-memory
//! implementations of the storage traits live in [`mock`] for tests.

pub mod blobs;
pub mod error;
pub mod git;
pub mod ids;
pub mod job_queue;
pub mod mock;
pub mod models;
pub mod pool;
pub mod repo_state;
pub mod schema;

pub use blobs::{BlobStore, PgBlobStore, sanitize_content};
pub use error::{DatabaseError, DatabaseResult};
pub use git::{ChangedFiles, GitError, GitMirror, RenamedFile};
pub use ids::{hash_content, new_repo_state_id};
pub use job_queue::{JobQueue, PgJobQueue};
pub use models::{ContentBlob, Job, JobPayload, JobState, RepoState};
pub use pool::initialize_database;
pub use repo_state::{PgRepoStateStore, RepoStateStore};
pub use schema::ensure_schema;
