//! Domain models for database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One record per repository URL
///
/// Created on the first job for a URL. `last_processed_commit` advances
/// monotonically on each successful job; records are never deleted by the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoState {
    /// 26-char sortable id (ULID), assigned when first seen
    pub id: String,
    /// Canonical remote URL (unique)
    pub repo_url: String,
    /// Absolute path of the working clone owned by the worker fleet
    pub local_path: String,
    /// Commit hash last successfully ingested, or None before bootstrap
    pub last_processed_commit: Option<String>,
    /// Path -> content hash; reserved for double-checking, may be empty
    pub file_signatures: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One record per source file per repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlob {
    /// Owning repository (filter key)
    pub repo_id: String,
    /// Relative path within the repository, e.g. `src/auth/auth.service.ts`
    pub id: String,
    /// Full sanitized UTF-8 text of the file
    pub content: String,
    /// Free-form mapping of primitives
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Queue wire format of an ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "repoId")]
    pub repo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "queuedAt")]
    pub queued_at: DateTime<Utc>,
}

/// State of a queued ingestion job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{state}")
    }
}

/// A job as stored in the durable queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub state: JobState,
    /// 0..100, updated at phase boundaries
    pub progress: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub failed_reason: Option<String>,
    pub claimed_by: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_round_trips() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
        ] {
            let parsed: JobState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("bogus".parse::<JobState>().is_err());
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let payload = JobPayload {
            repo_url: "https://github.com/acme/demo.git".into(),
            git_ref: "main".into(),
            token: None,
            user_id: Some("u-1".into()),
            repo_id: "demo".into(),
            meta: None,
            queued_at: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("repoUrl").is_some());
        assert!(json.get("ref").is_some());
        assert!(json.get("repoId").is_some());
        assert!(json.get("queuedAt").is_some());
        assert!(json.get("token").is_none());
    }
}
