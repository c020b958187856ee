//! End-to-end pipeline tests: real git fixture repositories driven through
//! the worker with in-memory storage and embedding implementations.

use chrono::Utc;
use git2::{IndexAddOption, Repository, Signature};
use rephole_embeddings::{EmbeddingError, EmbeddingProvider, MockEmbeddingProvider};
use rephole_ingestion::IngestionWorker;
use rephole_meta_data::mock::{MockBlobStore, MockJobQueue, MockRepoStateStore};
use rephole_meta_data::{JobPayload, JobQueue, JobState, RepoStateStore};
use rephole_parsing::{Chunker, GrammarRegistry};
use rephole_vector_data::MockVectorStorage;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn commit_all(repo: &Repository, message: &str) -> String {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("tester", "tester@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

const AUTH_TS: &str = r"
// Refreshes an access token before it expires.
export function refreshToken(token: string): string {
  return token + '-refreshed';
}

export function revokeToken(token: string): void {
  console.log('revoked', token);
}
";

const SESSION_TS: &str = r"
export function createSession(userId: string): string {
  return 'session-' + userId;
}
";

struct Harness {
    queue: Arc<MockJobQueue>,
    states: Arc<MockRepoStateStore>,
    blobs: Arc<MockBlobStore>,
    vectors: Arc<MockVectorStorage>,
    embeddings: Arc<MockEmbeddingProvider>,
    worker: IngestionWorker,
    _storage_root: TempDir,
}

fn harness_with_embeddings(
    provider: Arc<dyn EmbeddingProvider>,
    counter: Arc<MockEmbeddingProvider>,
) -> Harness {
    let queue = Arc::new(MockJobQueue::new());
    let states = Arc::new(MockRepoStateStore::new());
    let blobs = Arc::new(MockBlobStore::new());
    let vectors = Arc::new(MockVectorStorage::new());
    let storage_root = TempDir::new().unwrap();

    let worker = IngestionWorker::new(
        Arc::clone(&queue) as Arc<dyn JobQueue>,
        Arc::clone(&states) as Arc<dyn RepoStateStore>,
        Arc::clone(&blobs) as Arc<dyn rephole_meta_data::BlobStore>,
        Arc::clone(&vectors) as Arc<dyn rephole_vector_data::VectorStorage>,
        provider,
        Chunker::new(Arc::new(GrammarRegistry::new())),
        storage_root.path().to_path_buf(),
        "worker-test".into(),
        Duration::from_millis(10),
    );

    Harness {
        queue,
        states,
        blobs,
        vectors,
        embeddings: counter,
        worker,
        _storage_root: storage_root,
    }
}

fn harness() -> Harness {
    let embeddings = Arc::new(MockEmbeddingProvider::new(16));
    harness_with_embeddings(
        Arc::clone(&embeddings) as Arc<dyn EmbeddingProvider>,
        embeddings,
    )
}

fn fixture_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

fn payload_for(src: &TempDir, repo: &Repository, repo_id: &str) -> JobPayload {
    let branch = repo.head().unwrap().shorthand().unwrap().to_string();
    JobPayload {
        repo_url: src.path().to_str().unwrap().to_string(),
        git_ref: branch,
        token: None,
        user_id: Some("u-1".into()),
        repo_id: repo_id.into(),
        meta: None,
        queued_at: Utc::now(),
    }
}

async fn run_one_job(harness: &Harness, payload: &JobPayload) -> uuid::Uuid {
    let job = harness.queue.enqueue(payload).await.unwrap();
    let processed = harness.worker.process_one().await.unwrap();
    assert_eq!(processed, Some(job.id));
    job.id
}

#[tokio::test]
async fn bootstrap_ingest_indexes_every_tracked_text_file() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    write(src.path(), "src/session.ts", SESSION_TS);
    write(src.path(), "README.md", "# demo\n\nJust prose.\n");
    write(src.path(), "logo.png", "\u{89}PNG fake bytes");
    let head = commit_all(&repo, "init");

    let h = harness();
    let payload = payload_for(&src, &repo, "demo");
    let job_id = run_one_job(&h, &payload).await;

    // Job completed with full progress
    let job = h.queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.progress, 100);

    // State row created, commit recorded, clone present under the storage root
    let state = h
        .states
        .find_by_url(&payload.repo_url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.id.len(), 26);
    assert_eq!(state.last_processed_commit.as_deref(), Some(head.as_str()));
    assert!(Path::new(&state.local_path).join(".git").exists());

    // Vectors exist for the chunked sources
    let records = h.vectors.records();
    assert!(!records.is_empty());
    let parents: std::collections::HashSet<&str> = records
        .iter()
        .map(|r| {
            r.metadata
                .get("parentId")
                .and_then(Value::as_str)
                .unwrap()
        })
        .collect();
    assert!(parents.contains("src/auth.ts"));
    assert!(parents.contains("src/session.ts"));

    // Zero-chunk file: blob written, no vectors
    assert!(h.blobs.blob("demo", "README.md").is_some());
    assert!(!parents.contains("README.md"));

    // Binary file: neither blob nor vectors
    assert!(h.blobs.blob("demo", "logo.png").is_none());
    assert!(!parents.contains("logo.png"));

    // Invariant: every vector's parentId has a blob under the same repoId
    for record in &records {
        let parent = record.metadata.get("parentId").and_then(Value::as_str).unwrap();
        let repo_id = record.metadata.get("repoId").and_then(Value::as_str).unwrap();
        assert!(
            h.blobs.blob(repo_id, parent).is_some(),
            "missing blob for parent {parent}"
        );
    }

    // chunkIndex is dense 0..n-1 within each file
    let mut by_file: std::collections::HashMap<&str, Vec<i64>> = std::collections::HashMap::new();
    for record in &records {
        let file = record.metadata.get("filePath").and_then(Value::as_str).unwrap();
        let idx = record.metadata.get("chunkIndex").and_then(Value::as_i64).unwrap();
        by_file.entry(file).or_default().push(idx);
    }
    for (file, mut indexes) in by_file {
        indexes.sort_unstable();
        let expected: Vec<i64> = (0..indexes.len() as i64).collect();
        assert_eq!(indexes, expected, "sparse chunkIndex for {file}");
    }
}

#[tokio::test]
async fn reingesting_the_same_commit_is_a_no_op() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness();
    let payload = payload_for(&src, &repo, "demo");
    run_one_job(&h, &payload).await;

    let blob_writes = h.blobs.write_count();
    let embed_calls = h.embeddings.call_count();
    let vector_count = h.vectors.len();

    // Same commit again: zero blob writes, zero embeddings, zero upserts
    run_one_job(&h, &payload).await;

    assert_eq!(h.blobs.write_count(), blob_writes);
    assert_eq!(h.embeddings.call_count(), embed_calls);
    assert_eq!(h.vectors.len(), vector_count);
}

#[tokio::test]
async fn incremental_change_updates_only_what_moved() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/a.ts", AUTH_TS);
    write(src.path(), "src/b.ts", SESSION_TS);
    commit_all(&repo, "init");

    let h = harness();
    let payload = payload_for(&src, &repo, "demo");
    run_one_job(&h, &payload).await;

    let parents_of = |records: &[rephole_vector_data::VectorRecord]| {
        records
            .iter()
            .map(|r| {
                r.metadata
                    .get("parentId")
                    .and_then(Value::as_str)
                    .unwrap()
                    .to_string()
            })
            .collect::<std::collections::HashSet<String>>()
    };
    assert!(parents_of(&h.vectors.records()).contains("src/b.ts"));

    // Modify a, delete b, add c
    write(
        src.path(),
        "src/a.ts",
        "export function rotateKeys(): void {\n  console.log('rotate');\n}\n",
    );
    fs::remove_file(src.path().join("src/b.ts")).unwrap();
    write(src.path(), "src/c.ts", SESSION_TS);
    let second = commit_all(&repo, "change");

    run_one_job(&h, &payload).await;

    let records = h.vectors.records();
    let parents = parents_of(&records);
    assert!(!parents.contains("src/b.ts"), "deleted file still indexed");
    assert!(parents.contains("src/c.ts"));
    assert!(parents.contains("src/a.ts"));

    // a.ts now carries the new content only
    let a_names: Vec<&str> = records
        .iter()
        .filter(|r| r.metadata.get("parentId").and_then(Value::as_str) == Some("src/a.ts"))
        .map(|r| r.metadata.get("functionName").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(a_names, vec!["rotateKeys"]);

    let state = h
        .states
        .find_by_url(&payload.repo_url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.last_processed_commit.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn renamed_file_moves_its_vectors_to_the_new_path() {
    let (src, repo) = fixture_repo();
    write(src.path(), "old.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness();
    let payload = payload_for(&src, &repo, "demo");
    run_one_job(&h, &payload).await;

    fs::rename(src.path().join("old.ts"), src.path().join("new.ts")).unwrap();
    commit_all(&repo, "rename");
    run_one_job(&h, &payload).await;

    let records = h.vectors.records();
    assert!(records.iter().all(|r| {
        r.metadata.get("parentId").and_then(Value::as_str) != Some("old.ts")
    }));
    assert!(records.iter().any(|r| {
        r.metadata.get("parentId").and_then(Value::as_str) == Some("new.ts")
    }));
}

#[tokio::test]
async fn user_meta_is_attached_but_never_overrides_reserved_fields() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness();
    let mut payload = payload_for(&src, &repo, "demo");
    let mut meta = serde_json::Map::new();
    meta.insert("env".into(), Value::String("prod".into()));
    meta.insert("repoId".into(), Value::String("spoofed".into()));
    meta.insert("parentId".into(), Value::String("spoofed".into()));
    payload.meta = Some(meta);

    run_one_job(&h, &payload).await;

    for record in h.vectors.records() {
        assert_eq!(record.metadata.get("env").and_then(Value::as_str), Some("prod"));
        assert_eq!(record.metadata.get("repoId").and_then(Value::as_str), Some("demo"));
        assert_ne!(
            record.metadata.get("parentId").and_then(Value::as_str),
            Some("spoofed")
        );
        assert_eq!(
            record.metadata.get("category").and_then(Value::as_str),
            Some("repository")
        );
    }
}

#[tokio::test]
async fn unknown_last_commit_falls_back_to_full_reindex() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness();
    let payload = payload_for(&src, &repo, "demo");
    run_one_job(&h, &payload).await;

    // Corrupt the recorded commit
    let mut state = h
        .states
        .find_by_url(&payload.repo_url)
        .await
        .unwrap()
        .unwrap();
    state.last_processed_commit = Some("0123456789abcdef0123456789abcdef01234567".into());
    h.states.save(&state).await.unwrap();

    let job_id = run_one_job(&h, &payload).await;
    let job = h.queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(!h.vectors.is_empty());
}

struct FailingEmbeddings;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            message: "backend down".into(),
        })
    }

    fn dimension(&self) -> usize {
        16
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn phase_failures_retry_then_park_the_job_as_failed() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness_with_embeddings(
        Arc::new(FailingEmbeddings),
        Arc::new(MockEmbeddingProvider::new(16)),
    );
    let payload = payload_for(&src, &repo, "demo");
    let job = h.queue.enqueue(&payload).await.unwrap();

    // Three attempts, then the job parks as failed
    for _ in 0..3 {
        h.worker.process_one().await.unwrap();
    }

    let parked = h.queue.get(job.id).await.unwrap().unwrap();
    assert_eq!(parked.state, JobState::Failed);
    assert!(parked.failed_reason.unwrap().contains("backend down"));
    assert_eq!(h.queue.list_failed().await.unwrap().len(), 1);

    // No vectors made it in, and the repo state never advanced
    assert!(h.vectors.is_empty());
    let state = h
        .states
        .find_by_url(&payload.repo_url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.last_processed_commit, None);
}

#[tokio::test]
async fn two_repo_ids_of_the_same_repo_stay_separate() {
    let (src, repo) = fixture_repo();
    write(src.path(), "src/auth.ts", AUTH_TS);
    commit_all(&repo, "init");

    let h = harness();
    let mut prod = payload_for(&src, &repo, "demo-prod");
    let mut meta = serde_json::Map::new();
    meta.insert("env".into(), Value::String("prod".into()));
    prod.meta = Some(meta);
    run_one_job(&h, &prod).await;

    let mut dev = payload_for(&src, &repo, "demo-dev");
    // Repo state is keyed by URL; a distinct URL spelling gives the second
    // repoId its own state and clone
    dev.repo_url = format!("{}/", dev.repo_url);
    let mut meta = serde_json::Map::new();
    meta.insert("env".into(), Value::String("dev".into()));
    dev.meta = Some(meta);
    run_one_job(&h, &dev).await;

    // Same chunk ids, but points are scoped per repoId: both sides coexist
    let records = h.vectors.records();
    let prod_count = records
        .iter()
        .filter(|r| r.metadata.get("env").and_then(Value::as_str) == Some("prod"))
        .count();
    let dev_count = records
        .iter()
        .filter(|r| r.metadata.get("env").and_then(Value::as_str) == Some("dev"))
        .count();
    assert!(prod_count > 0);
    assert_eq!(prod_count, dev_count);
}
