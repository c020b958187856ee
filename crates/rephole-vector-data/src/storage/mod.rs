//! Storage backends for the vector index

pub mod mock;
pub mod qdrant;
pub mod traits;

pub use mock::MockVectorStorage;
pub use qdrant::QdrantStorage;
pub use traits::VectorStorage;
