//! Git working-clone mirror: clone, fetch, HEAD resolution, commit diffing
//!
//! The working directory for a repository is owned exclusively by the worker
//! processing its job; no concurrent clone/fetch on the same path.

use git2::build::RepoBuilder;
use git2::{
    Cred, Delta, DiffFindOptions, DiffOptions, FetchOptions, ObjectType, RemoteCallbacks,
    Repository, ResetType,
};
use std::path::Path;
use thiserror::Error;

/// Errors raised by the git mirror
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Clone destination {0} exists and is not an empty directory")]
    DestinationNotEmpty(String),

    #[error("Commit {0} is unknown in the working clone")]
    UnknownCommit(String),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Specialized Result type for git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// A rename keeps both sides; its identity for indexing is the new path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedFile {
    pub old_path: String,
    pub new_path: String,
}

/// Diff classification between two commits
#[derive(Debug, Clone, Default)]
pub struct ChangedFiles {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<RenamedFile>,
}

impl ChangedFiles {
    /// True when nothing needs (re-)indexing
    pub fn nothing_to_index(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.renamed.is_empty()
    }

    /// All paths that need indexing: added + modified + rename targets
    pub fn paths_to_index(&self) -> Vec<&str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
            .chain(self.renamed.iter().map(|r| r.new_path.as_str()))
            .collect()
    }

    /// All old paths whose vectors must be removed: deleted + rename sources
    pub fn paths_to_delete(&self) -> Vec<&str> {
        self.deleted
            .iter()
            .map(String::as_str)
            .chain(self.renamed.iter().map(|r| r.old_path.as_str()))
            .collect()
    }
}

/// Git operations over the worker-owned working clones
#[derive(Debug, Clone, Copy, Default)]
pub struct GitMirror;

impl GitMirror {
    pub const fn new() -> Self {
        Self
    }

    /// Clone `url` into `dst`
    ///
    /// `dst` must not exist, or be an empty directory. A non-empty directory
    /// or an existing file fails; a concurrent job losing this race retries
    /// at the queue level.
    ///
    /// # Errors
    ///
    /// Returns `DestinationNotEmpty` for an occupied destination and `Git`
    /// for remote/transport failures.
    pub fn clone(
        &self,
        url: &str,
        dst: &Path,
        git_ref: &str,
        token: Option<&str>,
    ) -> GitResult<()> {
        if dst.exists() {
            if !dst.is_dir() || dst.read_dir()?.next().is_some() {
                return Err(GitError::DestinationNotEmpty(dst.display().to_string()));
            }
        } else if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(url, dst = %dst.display(), git_ref, "Cloning repository");

        RepoBuilder::new()
            .branch(git_ref)
            .fetch_options(fetch_options(token))
            .clone(url, dst)?;

        Ok(())
    }

    /// Fetch the remote ref into an existing clone and hard-reset onto it
    ///
    /// Without this, a re-ingestion could never observe new commits.
    ///
    /// # Errors
    ///
    /// Returns `Git` when the clone cannot be opened or the fetch fails.
    pub fn fetch(&self, path: &Path, git_ref: &str, token: Option<&str>) -> GitResult<()> {
        let repo = Repository::open(path)?;
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(&[git_ref], Some(&mut fetch_options(token)), None)?;

        let fetched = repo.find_reference("FETCH_HEAD")?.peel_to_commit()?;
        repo.reset(fetched.as_object(), ResetType::Hard, None)?;

        Ok(())
    }

    /// Resolve the commit `HEAD` points at
    ///
    /// # Errors
    ///
    /// Returns `Git` when the clone is missing or has no commits yet.
    pub fn current_commit(&self, path: &Path) -> GitResult<String> {
        let repo = Repository::open(path)?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Diff `last_sha..HEAD` into added/modified/deleted/renamed sets
    ///
    /// With no `last_sha` (bootstrap) every tracked path is returned as
    /// added. An unknown/invalid `last_sha` yields `UnknownCommit`; the
    /// worker maps that back onto the bootstrap path.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCommit` for an unresolvable `last_sha` and `Git` for
    /// repository access failures.
    pub fn changed_files(&self, path: &Path, last_sha: Option<&str>) -> GitResult<ChangedFiles> {
        let repo = Repository::open(path)?;
        let head_commit = repo.head()?.peel_to_commit()?;

        let Some(last_sha) = last_sha else {
            return Ok(ChangedFiles {
                added: tracked_files(&head_commit.tree()?)?,
                ..ChangedFiles::default()
            });
        };

        let old_commit = git2::Oid::from_str(last_sha)
            .ok()
            .and_then(|oid| repo.find_commit(oid).ok())
            .ok_or_else(|| GitError::UnknownCommit(last_sha.to_string()))?;

        let old_tree = old_commit.tree()?;
        let new_tree = head_commit.tree()?;
        let mut diff = repo.diff_tree_to_tree(
            Some(&old_tree),
            Some(&new_tree),
            Some(&mut DiffOptions::new()),
        )?;
        let mut find_options = DiffFindOptions::new();
        find_options.renames(true);
        diff.find_similar(Some(&mut find_options))?;

        let mut changed = ChangedFiles::default();
        for delta in diff.deltas() {
            match delta.status() {
                Delta::Added | Delta::Copied => {
                    if let Some(p) = delta_path(delta.new_file().path()) {
                        changed.added.push(p);
                    }
                }
                Delta::Modified | Delta::Typechange => {
                    if let Some(p) = delta_path(delta.new_file().path()) {
                        changed.modified.push(p);
                    }
                }
                Delta::Deleted => {
                    if let Some(p) = delta_path(delta.old_file().path()) {
                        changed.deleted.push(p);
                    }
                }
                Delta::Renamed => {
                    if let (Some(old_path), Some(new_path)) = (
                        delta_path(delta.old_file().path()),
                        delta_path(delta.new_file().path()),
                    ) {
                        changed.renamed.push(RenamedFile { old_path, new_path });
                    }
                }
                _ => {}
            }
        }

        Ok(changed)
    }
}

/// Normalize a delta path to forward slashes
fn delta_path(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().replace('\\', "/"))
}

/// Collect every blob path in a tree, recursively
fn tracked_files(tree: &git2::Tree<'_>) -> GitResult<Vec<String>> {
    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                files.push(format!("{root}{name}"));
            }
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(files)
}

fn fetch_options(token: Option<&str>) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = token {
        let token = token.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", &token)
        });
    }
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}
