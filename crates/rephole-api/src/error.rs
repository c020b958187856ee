//! API error type and its HTTP representation
//!
//! Every error body has the shape `{statusCode, message, error}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

/// Specialized Result type for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub error: String,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(message = %self, "Request failed");
        }
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.to_string(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<rephole_ingestion::IngestionError> for ApiError {
    fn from(e: rephole_ingestion::IngestionError) -> Self {
        match e {
            rephole_ingestion::IngestionError::Validation(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<rephole_search::SearchError> for ApiError {
    fn from(e: rephole_search::SearchError) -> Self {
        match e {
            rephole_search::SearchError::BadRequest(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<rephole_meta_data::DatabaseError> for ApiError {
    fn from(e: rephole_meta_data::DatabaseError) -> Self {
        match e {
            rephole_meta_data::DatabaseError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
