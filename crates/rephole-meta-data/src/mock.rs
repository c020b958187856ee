//! In-memory implementations of the storage traits for tests
//!
//! These mirror the Postgres implementations closely enough to exercise the
//! worker, producer, and retriever logic without a database. Backoff
//! timestamps are not simulated: a failed-but-retryable job becomes visible
//! again immediately so tests can drive retries synchronously.

use crate::blobs::{BlobStore, sanitize_content};
use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{ContentBlob, Job, JobPayload, JobState, RepoState};
use crate::repo_state::RepoStateStore;
use crate::job_queue::JobQueue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory repo state store
#[derive(Default)]
pub struct MockRepoStateStore {
    states: Mutex<HashMap<String, RepoState>>,
}

impl MockRepoStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoStateStore for MockRepoStateStore {
    async fn find_by_url(&self, repo_url: &str) -> DatabaseResult<Option<RepoState>> {
        let states = self.states.lock().map_err(poisoned)?;
        Ok(states.values().find(|s| s.repo_url == repo_url).cloned())
    }

    async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<RepoState>> {
        let states = self.states.lock().map_err(poisoned)?;
        Ok(states.get(id).cloned())
    }

    async fn save(&self, state: &RepoState) -> DatabaseResult<()> {
        let mut states = self.states.lock().map_err(poisoned)?;
        states.insert(state.id.clone(), state.clone());
        Ok(())
    }
}

/// In-memory blob store, applying the same sanitization as Postgres
#[derive(Default)]
pub struct MockBlobStore {
    blobs: Mutex<HashMap<(String, String), ContentBlob>>,
    writes: Mutex<usize>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of save_parent calls so far (for idempotence assertions)
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    /// Direct lookup helper for assertions
    pub fn blob(&self, repo_id: &str, id: &str) -> Option<ContentBlob> {
        self.blobs
            .lock()
            .ok()
            .and_then(|b| b.get(&(repo_id.to_string(), id.to_string())).cloned())
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn save_parent(
        &self,
        repo_id: &str,
        id: &str,
        content: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> DatabaseResult<()> {
        let (cleaned, _) = sanitize_content(content);
        let mut blobs = self.blobs.lock().map_err(poisoned)?;
        blobs.insert(
            (repo_id.to_string(), id.to_string()),
            ContentBlob {
                repo_id: repo_id.to_string(),
                id: id.to_string(),
                content: cleaned,
                metadata: metadata.clone(),
            },
        );
        *self.writes.lock().map_err(poisoned)? += 1;
        Ok(())
    }

    async fn get_parent(&self, repo_id: &str, id: &str) -> DatabaseResult<Option<ContentBlob>> {
        let blobs = self.blobs.lock().map_err(poisoned)?;
        Ok(blobs.get(&(repo_id.to_string(), id.to_string())).cloned())
    }

    async fn get_parents(&self, repo_id: &str, ids: &[String]) -> DatabaseResult<Vec<ContentBlob>> {
        let blobs = self.blobs.lock().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| blobs.get(&(repo_id.to_string(), id.clone())).cloned())
            .collect())
    }
}

/// In-memory job queue
pub struct MockJobQueue {
    jobs: Mutex<Vec<Job>>,
    max_attempts: i32,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            max_attempts: 3,
        }
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, payload: &JobPayload) -> DatabaseResult<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            payload: payload.clone(),
            state: JobState::Waiting,
            progress: 0,
            attempts: 0,
            max_attempts: self.max_attempts,
            failed_reason: None,
            claimed_by: None,
            queued_at: payload.queued_at,
            started_at: None,
            finished_at: None,
        };
        self.jobs.lock().map_err(poisoned)?.push(job.clone());
        Ok(job)
    }

    async fn claim(&self, worker_id: &str) -> DatabaseResult<Option<Job>> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        let Some(job) = jobs
            .iter_mut()
            .filter(|j| j.state == JobState::Waiting)
            .min_by_key(|j| j.queued_at)
        else {
            return Ok(None);
        };
        job.state = JobState::Active;
        job.attempts += 1;
        job.claimed_by = Some(worker_id.to_string());
        job.started_at = Some(chrono::Utc::now());
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: Uuid) -> DatabaseResult<()> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.state = JobState::Completed;
            job.progress = 100;
            job.finished_at = Some(chrono::Utc::now());
            job.claimed_by = None;
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, reason: &str) -> DatabaseResult<()> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.failed_reason = Some(reason.to_string());
            job.claimed_by = None;
            if job.attempts >= job.max_attempts {
                job.state = JobState::Failed;
                job.finished_at = Some(chrono::Utc::now());
            } else {
                job.state = JobState::Waiting;
            }
        }
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> DatabaseResult<()> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.progress = progress.clamp(0, 100);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_failed(&self) -> DatabaseResult<Vec<Job>> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        Ok(jobs
            .iter()
            .filter(|j| j.state == JobState::Failed)
            .cloned()
            .collect())
    }

    async fn retry(&self, id: Uuid) -> DatabaseResult<bool> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.state == JobState::Failed)
        {
            job.state = JobState::Waiting;
            job.attempts = 0;
            job.failed_reason = None;
            job.finished_at = None;
            return Ok(true);
        }
        Ok(false)
    }

    async fn retry_all(&self) -> DatabaseResult<u64> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        let mut count = 0u64;
        for job in jobs.iter_mut().filter(|j| j.state == JobState::Failed) {
            job.state = JobState::Waiting;
            job.attempts = 0;
            job.failed_reason = None;
            job.finished_at = None;
            count += 1;
        }
        Ok(count)
    }

    async fn sweep(&self) -> DatabaseResult<u64> {
        Ok(0)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> DatabaseError {
    DatabaseError::Connection("mock store lock poisoned".into())
}
