//! Shared handler state

use rephole_ingestion::IngestionProducer;
use rephole_meta_data::JobQueue;
use rephole_search::QueryService;
use std::sync::Arc;

/// Everything the HTTP handlers need
#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<IngestionProducer>,
    pub queue: Arc<dyn JobQueue>,
    pub query: Arc<QueryService>,
}

impl AppState {
    pub fn new(
        producer: Arc<IngestionProducer>,
        queue: Arc<dyn JobQueue>,
        query: Arc<QueryService>,
    ) -> Self {
        Self {
            producer,
            queue,
            query,
        }
    }
}
