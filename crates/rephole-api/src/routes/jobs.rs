//! Job inspection and retry endpoints

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use rephole_meta_data::Job;
use serde::Serialize;
use uuid::Uuid;

/// Response for `GET /jobs/job/{jobId}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub state: String,
    /// 0..100
    pub progress: i32,
    pub data: serde_json::Value,
}

/// One entry of `GET /jobs/failed`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FailedJobResponse {
    pub id: Uuid,
    #[serde(rename = "failedReason")]
    pub failed_reason: Option<String>,
    #[serde(rename = "attemptsMade")]
    pub attempts_made: i32,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RetryResponse {
    pub retried: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/job/{job_id}", get(job_status_handler))
        .route("/jobs/failed", get(failed_jobs_handler))
        .route("/jobs/retry/all", post(retry_all_handler))
        .route("/jobs/retry/{job_id}", post(retry_handler))
}

fn job_data(job: &Job) -> serde_json::Value {
    serde_json::to_value(&job.payload).unwrap_or(serde_json::Value::Null)
}

async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .queue
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {job_id}")))?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        state: job.state.to_string(),
        progress: job.progress,
        data: job_data(&job),
    }))
}

async fn failed_jobs_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<FailedJobResponse>>> {
    let failed = state.queue.list_failed().await?;

    Ok(Json(
        failed
            .iter()
            .map(|job| FailedJobResponse {
                id: job.id,
                failed_reason: job.failed_reason.clone(),
                attempts_made: job.attempts,
                timestamp: job.finished_at,
                data: job_data(job),
            })
            .collect(),
    ))
}

async fn retry_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<RetryResponse>> {
    if state.queue.retry(job_id).await? {
        Ok(Json(RetryResponse { retried: 1 }))
    } else {
        Err(ApiError::NotFound(format!(
            "No failed job to retry: {job_id}"
        )))
    }
}

async fn retry_all_handler(State(state): State<AppState>) -> ApiResult<Json<RetryResponse>> {
    let retried = state.queue.retry_all().await?;
    Ok(Json(RetryResponse { retried }))
}
