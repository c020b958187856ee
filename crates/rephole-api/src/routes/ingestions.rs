//! Ingestion endpoint: validate and enqueue repository jobs

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use rephole_ingestion::IngestRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Request body for `POST /ingestions/repository`
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct IngestBody {
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "repoId")]
    pub repo_id: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

/// Response for a queued ingestion
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IngestResponse {
    pub status: String,
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(rename = "repoId")]
    pub repo_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/ingestions/repository", post(ingest_handler))
}

async fn ingest_handler(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let receipt = state
        .producer
        .enqueue(IngestRequest {
            repo_url: body.repo_url,
            git_ref: body.git_ref,
            token: body.token,
            user_id: body.user_id,
            repo_id: body.repo_id,
            meta: body.meta,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            status: receipt.status.to_string(),
            job_id: receipt.job_id,
            repo_url: receipt.repo_url,
            git_ref: receipt.git_ref,
            repo_id: receipt.repo_id,
        }),
    ))
}
