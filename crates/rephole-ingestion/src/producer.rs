//! Ingestion producer: request validation and job enqueueing
//!
//! Producers are stateless; they never touch working trees or the vector
//! store. All heavy lifting happens in the worker after the job round-trips
//! through the durable queue.

use crate::error::{IngestionError, IngestionResult};
use crate::meta;
use chrono::Utc;
use rephole_meta_data::{Job, JobPayload, JobQueue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Hosts accepted without a `.git` suffix on the path
const KNOWN_GIT_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

const DEFAULT_REF: &str = "main";

/// An ingestion request as received from the API
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub repo_url: String,
    pub git_ref: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub repo_id: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

/// What the client gets back after a successful enqueue
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub status: &'static str,
    pub job_id: uuid::Uuid,
    pub repo_url: String,
    pub git_ref: String,
    pub repo_id: String,
}

/// Validates requests and enqueues ingestion jobs
pub struct IngestionProducer {
    queue: Arc<dyn JobQueue>,
}

impl IngestionProducer {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Validate and enqueue one ingestion request
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed URL, an underivable repo id, or
    /// non-primitive meta; `Database` when the queue insert fails.
    #[tracing::instrument(skip(self, request), fields(repo_url = %request.repo_url))]
    pub async fn enqueue(&self, request: IngestRequest) -> IngestionResult<IngestReceipt> {
        validate_repo_url(&request.repo_url)?;
        validate_meta(request.meta.as_ref())?;

        let repo_id = match &request.repo_id {
            Some(id) => {
                validate_repo_id(id)?;
                id.clone()
            }
            None => derive_repo_id(&request.repo_url)?,
        };

        let git_ref = request
            .git_ref
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REF.to_string());

        let payload = JobPayload {
            repo_url: request.repo_url,
            git_ref,
            token: request.token,
            user_id: request.user_id,
            repo_id,
            meta: request.meta,
            queued_at: Utc::now(),
        };

        let job: Job = self.queue.enqueue(&payload).await?;
        tracing::info!(job_id = %job.id, repo_id = %job.payload.repo_id, "Ingestion job queued");

        Ok(IngestReceipt {
            status: "queued",
            job_id: job.id,
            repo_url: job.payload.repo_url,
            git_ref: job.payload.git_ref,
            repo_id: job.payload.repo_id,
        })
    }
}

/// A well-formed repo URL is http(s) and either ends in `.git` or lives on
/// a known host
fn validate_repo_url(url: &str) -> IngestionResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            IngestionError::Validation(format!("repoUrl must be an HTTP(S) URL: {url}"))
        })?;

    let host = rest
        .split('/')
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if host.is_empty() {
        return Err(IngestionError::Validation(format!(
            "repoUrl has no host: {url}"
        )));
    }

    if url.ends_with(".git") || KNOWN_GIT_HOSTS.contains(&host.as_str()) {
        Ok(())
    } else {
        Err(IngestionError::Validation(format!(
            "repoUrl must end in .git or use a known git host: {url}"
        )))
    }
}

/// Derive the repo id from the trailing path segment, minus `.git`
fn derive_repo_id(url: &str) -> IngestionResult<String> {
    let candidate = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_string();

    validate_repo_id(&candidate)?;
    Ok(candidate)
}

fn validate_repo_id(id: &str) -> IngestionResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(IngestionError::Validation(format!(
            "repoId must match [A-Za-z0-9._-]+: {id:?}"
        )))
    }
}

/// Producer-side meta validation rejects the request outright; the worker
/// additionally filters reserved names when building records
fn validate_meta(user_meta: Option<&Map<String, Value>>) -> IngestionResult<()> {
    let Some(user_meta) = user_meta else {
        return Ok(());
    };

    for (key, value) in user_meta {
        if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
            return Err(IngestionError::Validation(format!(
                "meta.{key} must be a primitive (string, number, or boolean)"
            )));
        }
        if meta::RESERVED_METADATA_FIELDS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "User meta collides with a reserved field and will be ignored");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rephole_meta_data::mock::MockJobQueue;

    fn producer() -> IngestionProducer {
        IngestionProducer::new(Arc::new(MockJobQueue::new()))
    }

    fn request(url: &str) -> IngestRequest {
        IngestRequest {
            repo_url: url.into(),
            git_ref: None,
            token: None,
            user_id: None,
            repo_id: None,
            meta: None,
        }
    }

    #[tokio::test]
    async fn enqueue_derives_repo_id_and_defaults_ref() {
        let receipt = producer()
            .enqueue(request("https://github.com/acme/demo.git"))
            .await
            .unwrap();

        assert_eq!(receipt.status, "queued");
        assert_eq!(receipt.repo_id, "demo");
        assert_eq!(receipt.git_ref, "main");
    }

    #[tokio::test]
    async fn known_host_without_git_suffix_is_accepted() {
        let receipt = producer()
            .enqueue(request("https://gitlab.com/acme/tool"))
            .await
            .unwrap();
        assert_eq!(receipt.repo_id, "tool");
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected() {
        for url in [
            "git@github.com:acme/demo.git",
            "ftp://example.com/demo.git",
            "not a url",
        ] {
            let err = producer().enqueue(request(url)).await.unwrap_err();
            assert!(matches!(err, IngestionError::Validation(_)), "url: {url}");
        }
    }

    #[tokio::test]
    async fn unknown_host_without_git_suffix_is_rejected() {
        let err = producer()
            .enqueue(request("https://example.com/acme/demo"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::Validation(_)));
    }

    #[tokio::test]
    async fn underivable_repo_id_fails_the_request() {
        let err = producer()
            .enqueue(request("https://github.com/acme/bad%20name"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::Validation(_)));
    }

    #[tokio::test]
    async fn explicit_repo_id_is_validated() {
        let mut req = request("https://github.com/acme/demo.git");
        req.repo_id = Some("has spaces".into());
        let err = producer().enqueue(req).await.unwrap_err();
        assert!(matches!(err, IngestionError::Validation(_)));

        let mut req = request("https://github.com/acme/demo.git");
        req.repo_id = Some("demo_prod-1.2".into());
        let receipt = producer().enqueue(req).await.unwrap();
        assert_eq!(receipt.repo_id, "demo_prod-1.2");
    }

    #[tokio::test]
    async fn nested_meta_rejects_the_request() {
        let mut req = request("https://github.com/acme/demo.git");
        let mut meta = Map::new();
        meta.insert("tags".into(), serde_json::json!(["a"]));
        req.meta = Some(meta);

        let err = producer().enqueue(req).await.unwrap_err();
        assert!(matches!(err, IngestionError::Validation(_)));
    }

    #[tokio::test]
    async fn flat_primitive_meta_is_accepted() {
        let mut req = request("https://github.com/acme/demo.git");
        let mut meta = Map::new();
        meta.insert("env".into(), Value::String("prod".into()));
        meta.insert("priority".into(), Value::from(2));
        req.meta = Some(meta);

        assert!(producer().enqueue(req).await.is_ok());
    }
}
