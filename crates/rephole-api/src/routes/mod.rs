//! Route composition

pub mod health;
pub mod ingestions;
pub mod jobs;
pub mod queries;

use crate::state::AppState;
use axum::Router;

/// Assemble the full application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(ingestions::routes())
        .merge(jobs::routes())
        .merge(queries::routes())
        .with_state(state)
}
