//! rephole ingestion worker
//!
//! Consumer process: claims jobs from the durable queue one at a time and
//! runs the ingestion pipeline. Serves only /health over HTTP. Scale
//! horizontally; working clones are owned by one worker per job.

mod memory;

use anyhow::Context;
use axum::{Json, Router, routing::get};
use rephole_config::ApplicationConfig;
use rephole_embeddings::OpenAiEmbeddingClient;
use rephole_ingestion::IngestionWorker;
use rephole_meta_data::{PgBlobStore, PgJobQueue, PgRepoStateStore};
use rephole_parsing::{Chunker, GrammarRegistry};
use rephole_vector_data::QdrantStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rephole_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting rephole ingestion worker");

    let config = ApplicationConfig::from_env();
    config.validate().context("Invalid configuration")?;

    // All languages failing to load leaves nothing to index; refuse to start
    let registry = Arc::new(GrammarRegistry::new());
    anyhow::ensure!(
        !registry.is_empty(),
        "No tree-sitter grammars loaded, refusing to start"
    );

    let pool = rephole_meta_data::initialize_database(&config.database).await?;

    let queue = Arc::new(PgJobQueue::new(pool.clone(), config.queue.clone()));
    let repo_states = Arc::new(PgRepoStateStore::new(pool.clone()));
    let blobs = Arc::new(PgBlobStore::new(pool));
    let vectors = Arc::new(
        QdrantStorage::connect(
            &config.vector_storage.url,
            &config.vector_storage.collection_name,
            config.vector_storage.dimension,
            config.vector_storage.batch_size,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Vector store bootstrap failed: {e}"))?,
    );
    let embeddings = Arc::new(OpenAiEmbeddingClient::new(config.embedding.clone()));

    let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
    let worker = Arc::new(IngestionWorker::new(
        queue,
        repo_states,
        blobs,
        vectors,
        embeddings,
        Chunker::new(registry),
        config.storage.local_path.clone(),
        worker_id.clone(),
        Duration::from_millis(config.worker.poll_interval_ms),
    ));
    let shutdown = worker.shutdown_handle();

    if config.worker.memory_monitoring {
        tokio::spawn(memory::monitor_rss(config.worker.memory_warn_mb));
    }

    // Health endpoint for readiness probes
    let health_router = Router::new().route(
        "/health",
        get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
    );
    let addr: SocketAddr = format!("0.0.0.0:{}", config.worker.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(worker_id = %worker_id, "Health endpoint on {addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    let run_handle = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
    run_handle.await?;

    Ok(())
}
