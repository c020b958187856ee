//! Ingestion pipeline for rephole
//!
//! The producer side validates requests and enqueues durable jobs; the
//! worker side consumes them: clone/fetch, diff against the last processed
//! commit, delete vanished paths, chunk + embed + upsert what changed, then
//! advance the repository state.

pub mod binary_ext;
pub mod error;
pub mod meta;
pub mod producer;
pub mod worker;

pub use error::{IngestionError, IngestionResult};
pub use producer::{IngestReceipt, IngestRequest, IngestionProducer};
pub use worker::{FileOutcome, IngestionWorker, JobSummary};
