//! HTTP API for rephole
//!
//! The producer-facing surface: enqueue ingestions, inspect and retry jobs,
//! run semantic queries. Workers run in a separate process (see the
//! rephole-worker binary).

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
