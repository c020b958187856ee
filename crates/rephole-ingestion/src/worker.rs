//! Ingestion worker: consumes queue jobs and drives the pipeline
//!
//! One job at a time per worker:
//!
//! ```text
//! Resolve -> Diff -> Delete -> (Short-circuit?) -> Per-file -> Commit
//! ```
//!
//! Per-file problems (unreadable, undecodable, zero chunks, duplicate chunk
//! ids) are logged and the loop continues; phase-level failures (git, blob
//! store, embedding, vector store) fail the job and the queue retries it
//! with backoff.

use crate::binary_ext::is_binary_path;
use crate::error::{IngestionError, IngestionResult};
use crate::meta::{self, RecordContext};
use chrono::Utc;
use rephole_common::CorrelationId;
use rephole_embeddings::EmbeddingProvider;
use rephole_meta_data::{
    BlobStore, GitError, GitMirror, Job, JobPayload, JobQueue, RepoState, RepoStateStore,
    hash_content, new_repo_state_id,
};
use rephole_parsing::{Chunk, Chunker};
use rephole_vector_data::{Filter, VectorDataError, VectorStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one file of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    SkippedBinary,
    SkippedDecode,
    SkippedNoChunks,
    Failed(String),
}

/// Aggregated result of one job
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub no_changes: bool,
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub chunks_indexed: usize,
    pub deleted_paths: usize,
}

/// The consumer side of the pipeline
pub struct IngestionWorker {
    queue: Arc<dyn JobQueue>,
    repo_states: Arc<dyn RepoStateStore>,
    blobs: Arc<dyn BlobStore>,
    vectors: Arc<dyn VectorStorage>,
    embeddings: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    mirror: GitMirror,
    storage_root: PathBuf,
    worker_id: String,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl IngestionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        repo_states: Arc<dyn RepoStateStore>,
        blobs: Arc<dyn BlobStore>,
        vectors: Arc<dyn VectorStorage>,
        embeddings: Arc<dyn EmbeddingProvider>,
        chunker: Chunker,
        storage_root: PathBuf,
        worker_id: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            repo_states,
            blobs,
            vectors,
            embeddings,
            chunker,
            mirror: GitMirror::new(),
            storage_root,
            worker_id,
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for signalling graceful shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Main loop: claim, process, acknowledge, repeat until shutdown
    pub async fn run(&self) {
        info!(worker_id = %self.worker_id, "Ingestion worker started");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!(worker_id = %self.worker_id, "Shutdown signal received");
                break;
            }

            match self.process_one().await {
                Ok(Some(_)) => {}
                Ok(None) => sleep(self.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "Queue interaction failed");
                    sleep(self.poll_interval.saturating_mul(5)).await;
                }
            }
        }

        info!(worker_id = %self.worker_id, "Ingestion worker stopped");
    }

    /// Claim and process a single job
    ///
    /// Returns the job id when one was claimed, None on an empty queue. Job
    /// processing failures are recorded against the queue (retry/park), not
    /// returned; only queue-level errors surface here.
    ///
    /// # Errors
    ///
    /// Returns `Database` when the queue itself cannot be reached.
    pub async fn process_one(&self) -> IngestionResult<Option<Uuid>> {
        let Some(job) = self.queue.claim(&self.worker_id).await? else {
            return Ok(None);
        };

        // One correlation id per job delivery so producer, worker, and
        // storage log lines can be stitched together
        let correlation_id = CorrelationId::from_uuid(job.id);
        info!(
            correlation_id = %correlation_id,
            job_id = %job.id,
            repo_url = %job.payload.repo_url,
            attempt = job.attempts,
            "Processing ingestion job"
        );

        match self.process_job(&job).await {
            Ok(summary) => {
                info!(
                    correlation_id = %correlation_id,
                    job_id = %job.id,
                    indexed = summary.indexed_files,
                    skipped = summary.skipped_files,
                    failed = summary.failed_files,
                    chunks = summary.chunks_indexed,
                    deleted = summary.deleted_paths,
                    "Job finished"
                );
                self.queue.complete(job.id).await?;
                if let Err(e) = self.queue.sweep().await {
                    warn!(error = %e, "Queue retention sweep failed");
                }
            }
            Err(e) => {
                error!(correlation_id = %correlation_id, job_id = %job.id, error = %e, "Job failed");
                self.queue.fail(job.id, &e.to_string()).await?;
            }
        }

        Ok(Some(job.id))
    }

    /// Execute the full state machine for one job
    ///
    /// # Errors
    ///
    /// Any phase-level failure: git access, blob writes, embedding calls,
    /// vector store calls, state persistence.
    pub async fn process_job(&self, job: &Job) -> IngestionResult<JobSummary> {
        let payload = &job.payload;
        let mut state = self.resolve_state(payload).await?;
        self.queue.set_progress(job.id, 10).await?;

        let clone_path = PathBuf::from(&state.local_path);
        let current_commit = self.mirror.current_commit(&clone_path)?;

        let changed = match self
            .mirror
            .changed_files(&clone_path, state.last_processed_commit.as_deref())
        {
            Ok(changed) => changed,
            Err(GitError::UnknownCommit(sha)) => {
                warn!(sha = %sha, "Last processed commit unknown; re-indexing from scratch");
                self.mirror.changed_files(&clone_path, None)?
            }
            Err(e) => return Err(e.into()),
        };
        self.queue.set_progress(job.id, 20).await?;

        // Deletions are applied even when nothing needs indexing
        let to_delete = changed.paths_to_delete();
        for old_path in &to_delete {
            let mut filter = Filter::new();
            filter.insert(
                "repoId".into(),
                serde_json::Value::String(payload.repo_id.clone()),
            );
            filter.insert(
                "parentId".into(),
                serde_json::Value::String((*old_path).to_string()),
            );
            self.vectors.delete_by_filter(&filter).await?;
            state.file_signatures.remove(*old_path);
            debug!(path = %old_path, "Deleted vectors for vanished path");
        }
        self.queue.set_progress(job.id, 30).await?;

        let mut summary = JobSummary {
            deleted_paths: to_delete.len(),
            ..JobSummary::default()
        };

        if changed.nothing_to_index() {
            info!(repo_url = %payload.repo_url, "No changes detected");
            summary.no_changes = true;
            state.last_processed_commit = Some(current_commit);
            state.updated_at = Utc::now();
            self.repo_states.save(&state).await?;
            return Ok(summary);
        }

        let user_meta = meta::sanitize_user_meta(payload.meta.as_ref());
        let context = RecordContext {
            repo_id: payload.repo_id.clone(),
            repository_id: state.id.clone(),
            user_id: payload.user_id.clone(),
            timestamp: Utc::now(),
        };

        let files: Vec<String> = changed
            .paths_to_index()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        let total = files.len().max(1);

        for (index, file_path) in files.iter().enumerate() {
            let outcome = self
                .process_file(&context, &clone_path, file_path, &user_meta, &mut state)
                .await?;

            match outcome {
                FileOutcome::Indexed { chunks } => {
                    summary.indexed_files += 1;
                    summary.chunks_indexed += chunks;
                }
                FileOutcome::SkippedBinary
                | FileOutcome::SkippedDecode
                | FileOutcome::SkippedNoChunks => summary.skipped_files += 1,
                FileOutcome::Failed(reason) => {
                    warn!(path = %file_path, reason = %reason, "File failed; continuing with the rest");
                    summary.failed_files += 1;
                }
            }

            let progress = 30 + ((index + 1) * 60 / total) as i32;
            self.queue.set_progress(job.id, progress).await?;
        }

        state.last_processed_commit = Some(current_commit);
        state.updated_at = Utc::now();
        self.repo_states.save(&state).await?;

        Ok(summary)
    }

    /// Look up or create the repository state and make the working clone
    /// current
    async fn resolve_state(&self, payload: &JobPayload) -> IngestionResult<RepoState> {
        let token = payload.token.as_deref();

        if let Some(state) = self.repo_states.find_by_url(&payload.repo_url).await? {
            let clone_path = PathBuf::from(&state.local_path);
            if self.mirror.current_commit(&clone_path).is_ok() {
                self.mirror.fetch(&clone_path, &payload.git_ref, token)?;
            } else {
                // State says a clone exists but it is gone or unusable:
                // heal by re-cloning; if that also fails, the job fails and
                // the queue keeps it for inspection
                warn!(path = %state.local_path, "Working clone missing, re-cloning");
                self.mirror
                    .clone(&payload.repo_url, &clone_path, &payload.git_ref, token)?;
            }
            return Ok(state);
        }

        let id = new_repo_state_id();
        let clone_path = self.storage_root.join(&id);

        // A directory can already exist here after a crash between clone
        // and state persistence; a valid repository is reused as-is
        if self.mirror.current_commit(&clone_path).is_err() {
            self.mirror
                .clone(&payload.repo_url, &clone_path, &payload.git_ref, token)?;
        }

        let now = Utc::now();
        let state = RepoState {
            id,
            repo_url: payload.repo_url.clone(),
            local_path: clone_path.display().to_string(),
            last_processed_commit: None,
            file_signatures: std::collections::HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        self.repo_states.save(&state).await?;

        Ok(state)
    }

    async fn process_file(
        &self,
        context: &RecordContext,
        clone_path: &Path,
        file_path: &str,
        user_meta: &serde_json::Map<String, serde_json::Value>,
        state: &mut RepoState,
    ) -> IngestionResult<FileOutcome> {
        if is_binary_path(file_path) {
            debug!(path = file_path, "Skipping binary file");
            return Ok(FileOutcome::SkippedBinary);
        }

        let absolute = clone_path.join(file_path);
        let bytes = match tokio::fs::read(&absolute).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = file_path, error = %e, "Failed to read file");
                return Ok(FileOutcome::Failed(format!("read failed: {e}")));
            }
        };

        let Ok(content) = String::from_utf8(bytes) else {
            warn!(path = file_path, "File is not valid UTF-8, skipping");
            return Ok(FileOutcome::SkippedDecode);
        };

        // Parent write happens before chunking: a file the grammar yields
        // nothing for still gets its blob
        self.blobs
            .save_parent(&context.repo_id, file_path, &content, user_meta)
            .await?;
        state
            .file_signatures
            .insert(file_path.to_string(), hash_content(&content));

        // Chunk ids shift with names and line numbers, so a modified file's
        // previous vectors would survive a bare upsert. Clear the path first.
        let mut stale = Filter::new();
        stale.insert(
            "repoId".into(),
            serde_json::Value::String(context.repo_id.clone()),
        );
        stale.insert(
            "parentId".into(),
            serde_json::Value::String(file_path.to_string()),
        );
        self.vectors.delete_by_filter(&stale).await?;

        let chunks: Vec<Chunk> = self
            .chunker
            .split(file_path, &content)
            .into_iter()
            .filter(|c| !c.content.trim().is_empty())
            .collect();

        if chunks.is_empty() {
            warn!(path = file_path, "No chunks produced, skipping vectors");
            return Ok(FileOutcome::SkippedNoChunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IngestionError::Other(format!(
                "embedding count mismatch for {file_path}: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let records = meta::build_records(context, file_path, &chunks, vectors, user_meta);

        match self.vectors.upsert(&records).await {
            Ok(()) => Ok(FileOutcome::Indexed {
                chunks: records.len(),
            }),
            Err(VectorDataError::DuplicateChunkIds(ids)) => {
                // Do not poison the collection; drop this file and move on
                error!(path = file_path, ids = ?ids, "Duplicate chunk ids, rejecting file");
                Ok(FileOutcome::Failed(format!(
                    "duplicate chunk ids: {}",
                    ids.join(", ")
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}
