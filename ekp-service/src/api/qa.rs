//! Question answering endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::QaSession;
use crate::error::ServiceResult;

use super::{AppState, default_page_limit};

/// Question request
#[derive(Deserialize)]
pub struct AskRequest {
    pub user_id: String,
    pub question: String,
    pub document_id: Option<String>,
}

/// QA history query parameters
#[derive(Deserialize)]
pub struct ListQaParams {
    pub user_id: Option<String>,
    pub document_id: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

/// Ask a question, optionally about one document
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> ServiceResult<Json<QaSession>> {
    let session = state
        .service
        .answer(
            &request.user_id,
            &request.question,
            request.document_id.as_deref(),
        )
        .await?;
    Ok(Json(session))
}

/// Get a recorded exchange
pub async fn get_qa_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<QaSession>> {
    Ok(Json(state.service.get_qa_session(&id)?))
}

/// QA history, newest first
pub async fn list_qa_sessions_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQaParams>,
) -> ServiceResult<Json<Vec<QaSession>>> {
    let sessions = state.service.list_qa_sessions(
        params.user_id.as_deref(),
        params.document_id.as_deref(),
        params.offset,
        params.limit,
    )?;
    Ok(Json(sessions))
}
