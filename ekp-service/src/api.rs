//! HTTP API for the EKP service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document upload, ingestion and management
//! - Question answering and QA history

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::KnowledgeService;

pub mod documents;
pub mod qa;
use documents::{
    delete_document_handler, get_document_chunks_handler, get_document_handler,
    get_document_text_handler, ingest_document_handler, list_documents_handler,
    reset_document_handler, upload_document_handler,
};
use qa::{ask_handler, get_qa_session_handler, list_qa_sessions_handler};

/// Multipart framing on top of the document itself
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<KnowledgeService>,
    pub metrics: PrometheusHandle,
    pub start_time: Instant,
}

/// Page size when a list request names none
fn default_page_limit() -> usize {
    20
}

/// Build the API router
pub fn router(service: Arc<KnowledgeService>, metrics: PrometheusHandle) -> Router {
    let max_body_size =
        service.config.ingestion.max_document_size_bytes as usize + UPLOAD_OVERHEAD_BYTES;

    let state = Arc::new(AppState {
        service,
        metrics,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Document endpoints - with larger body limit for file uploads
        .route(
            "/documents",
            get(list_documents_handler)
                .post(upload_document_handler)
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/documents/{id}",
            get(get_document_handler).delete(delete_document_handler),
        )
        .route("/documents/{id}/text", get(get_document_text_handler))
        .route("/documents/{id}/chunks", get(get_document_chunks_handler))
        .route("/documents/{id}/ingest", post(ingest_document_handler))
        .route("/documents/{id}/reset", post(reset_document_handler))
        // Question answering
        .route("/qa", post(ask_handler).get(list_qa_sessions_handler))
        .route("/qa/{id}", get(get_qa_session_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model_available = state.service.model.health_check().await;

    let status = if model_available {
        "healthy"
    } else {
        "degraded: model backend unavailable"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model: state.service.model.model_id().to_string(),
        model_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    model: String,
    model_available: bool,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
