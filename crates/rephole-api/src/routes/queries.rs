//! Query endpoints: parent and chunk retrieval

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use rephole_search::{QueryHit, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request body for both query endpoints
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct QueryBody {
    pub prompt: String,
    /// 1..100; anything else falls back to the default of 5
    pub k: Option<Value>,
    pub meta: Option<Map<String, Value>>,
}

/// Response wrapper
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryHit>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/queries/search/{repo_id}", post(search_handler))
        .route("/queries/search/{repo_id}/chunk", post(search_chunks_handler))
}

impl From<QueryBody> for SearchRequest {
    fn from(body: QueryBody) -> Self {
        Self {
            prompt: body.prompt,
            k: body.k,
            meta: body.meta,
        }
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<QueryResponse>> {
    let results = state.query.search(&repo_id, &body.into()).await?;
    Ok(Json(QueryResponse { results }))
}

async fn search_chunks_handler(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<QueryResponse>> {
    let results = state.query.search_chunks(&repo_id, &body.into()).await?;
    Ok(Json(QueryResponse { results }))
}
