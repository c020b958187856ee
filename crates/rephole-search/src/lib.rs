//! Query side of rephole: parent-child retrieval over the vector index and
//! blob store, plus the prompt-facing query service.

pub mod error;
pub mod retriever;
pub mod service;

pub use error::{SearchError, SearchResult};
pub use retriever::{RetrievedItem, Retriever};
pub use service::{QueryHit, QueryService, SearchRequest};
