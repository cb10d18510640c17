use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ekp_service::api;
use ekp_service::config::load_config;
use ekp_service::service::KnowledgeService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting EKP service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        model = %config.ollama.default_model,
        "Configuration loaded"
    );

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let service = Arc::new(KnowledgeService::from_config(config).await?);

    // Anything still PROCESSING was interrupted by the previous shutdown or crash
    service.recover_interrupted_documents()?;

    let worker = if service.config.ingestion.worker_enabled {
        Some(KnowledgeService::start_ingestion_worker(service.clone()))
    } else {
        warn!("Background ingestion worker disabled; documents are ingested on request only");
        None
    };

    let app = api::router(service.clone(), metrics);

    let addr = format!("{}:{}", service.config.server.host, service.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ekp_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
