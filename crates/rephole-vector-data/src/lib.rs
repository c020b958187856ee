//! Vector index tier for rephole
//!
//! Wraps Qdrant behind the [`VectorStorage`] trait: batched upserts with
//! duplicate-id rejection, ANN search with flat-equality filters, deletes by
//! id and by filter, and idempotent collection bootstrap. An in-memory mock
//! lives in [`storage::mock`] for tests.

pub mod error;
pub mod record;
pub mod storage;

pub use error::{VectorDataError, VectorDataResult};
pub use record::{Filter, SearchHit, VectorRecord, point_id, validate_unique_ids};
pub use storage::{MockVectorStorage, QdrantStorage, VectorStorage};
