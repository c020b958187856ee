//! rephole API server
//!
//! Producer process: validates ingestion requests, enqueues jobs, serves
//! job inspection and semantic queries. Stateless with respect to ingestion
//! progress; scale horizontally as needed.

use rephole_api::{AppState, routes};
use rephole_config::ApplicationConfig;
use rephole_embeddings::OpenAiEmbeddingClient;
use rephole_ingestion::IngestionProducer;
use rephole_meta_data::{JobQueue, PgBlobStore, PgJobQueue};
use rephole_search::{QueryService, Retriever};
use rephole_vector_data::QdrantStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult {
    rephole_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting rephole API server");

    let config = ApplicationConfig::from_env();
    config.validate()?;
    info!(
        database = %config.database.safe_connection_string(),
        qdrant = %config.vector_storage.url,
        collection = %config.vector_storage.collection_name,
        "Configuration loaded"
    );

    let pool = rephole_meta_data::initialize_database(&config.database).await?;

    let queue = Arc::new(PgJobQueue::new(pool.clone(), config.queue.clone()));
    let blobs = Arc::new(PgBlobStore::new(pool));
    let vectors = Arc::new(
        QdrantStorage::connect(
            &config.vector_storage.url,
            &config.vector_storage.collection_name,
            config.vector_storage.dimension,
            config.vector_storage.batch_size,
        )
        .await?,
    );
    let embeddings = Arc::new(OpenAiEmbeddingClient::new(config.embedding.clone()));

    let retriever = Retriever::new(vectors, blobs);
    let query = Arc::new(QueryService::new(embeddings, retriever));
    let producer = Arc::new(IngestionProducer::new(
        Arc::clone(&queue) as Arc<dyn JobQueue>
    ));

    let state = AppState::new(producer, queue, query);
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
