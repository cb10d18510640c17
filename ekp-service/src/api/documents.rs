//! Document API endpoints.
//!
//! Upload, listing, text access, ingestion triggers, reset and delete.

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartError,
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Document, DocumentChunk, DocumentStatus, ExtractedText};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::service::IngestFailure;

use super::{AppState, default_page_limit};

/// List documents query parameters
#[derive(Deserialize)]
pub struct ListDocumentsParams {
    pub status: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

/// One page of documents
#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// A document with the infrastructure failure of its last aborted run, if
/// any. Such a document reads `PENDING` with no error message; the failure
/// tells "system degraded" apart from "not yet ingested".
#[derive(Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ingest_failure: Option<IngestFailure>,
}

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

fn multipart_error(error: MultipartError, limit: u64) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge { limit }
    } else {
        ServiceError::Validation {
            message: error.body_text(),
        }
    }
}

/// List documents, newest first
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> ServiceResult<Json<DocumentListResponse>> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            DocumentStatus::parse(s).ok_or_else(|| ServiceError::Validation {
                message: format!("unknown document status: {}", s),
            })
        })
        .transpose()?;

    let (documents, total) =
        state
            .service
            .list_documents(status, params.offset, params.limit)?;

    Ok(Json(DocumentListResponse {
        documents,
        total,
        offset: params.offset,
        limit: params.limit,
    }))
}

/// Upload a new document.
///
/// Multipart fields: `file` (required), `title`, `created_by`.
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ServiceResult<(StatusCode, Json<Document>)> {
    let limit = state.service.config.ingestion.max_document_size_bytes;
    let mut file_data: Option<(Vec<u8>, String)> = None;
    let mut title: Option<String> = None;
    let mut created_by: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file_data = Some((data.to_vec(), filename));
            }
            "title" => {
                title = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            "created_by" => {
                created_by = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let (data, filename) = file_data.ok_or_else(|| ServiceError::Validation {
        message: "multipart field 'file' is required".to_string(),
    })?;

    let document = state
        .service
        .create_document(
            title.as_deref(),
            &filename,
            &data,
            created_by.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// Get a document by ID
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<DocumentDetail>> {
    let document = state.service.get_document(&id)?;
    Ok(Json(DocumentDetail {
        last_ingest_failure: state.service.last_ingest_failure(&id),
        document,
    }))
}

/// Extracted text of a processed document
pub async fn get_document_text_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ExtractedText>> {
    Ok(Json(state.service.get_extracted_text(&id)?))
}

/// Indexed chunks of a document
pub async fn get_document_chunks_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Vec<DocumentChunk>>> {
    Ok(Json(state.service.get_document_chunks(&id)?))
}

/// Start ingesting a pending document.
///
/// Answers 202 once the document is known to be ingestible; the run itself
/// continues in the background. Its outcome is visible on the document: a
/// terminal status, or `last_ingest_failure` when the system failed it.
pub async fn ingest_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<(StatusCode, Json<Document>)> {
    let document = state.service.get_document(&id)?;
    match document.status {
        DocumentStatus::Pending => {}
        DocumentStatus::Processing => {
            return Err(ServiceError::AlreadyProcessing { document_id: id });
        }
        from => {
            return Err(ServiceError::InvalidTransition {
                document_id: id,
                from,
                to: DocumentStatus::Processing,
            });
        }
    }

    let service = state.service.clone();
    let doc_id = id.clone();
    tokio::spawn(async move {
        if let Err(e) = service.ingest(&doc_id).await {
            warn!(doc_id = %doc_id, error = %format_error_chain_ref(&e), "Requested ingestion did not complete");
        }
    });

    info!(doc_id = %id, "Ingestion requested");
    Ok((StatusCode::ACCEPTED, Json(document)))
}

/// Return a processed or failed document to pending
pub async fn reset_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Document>> {
    Ok(Json(state.service.reset_document(&id)?))
}

/// Delete a document
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServiceResult<Json<DeleteResponse>> {
    state.service.delete_document(&id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Document {} deleted", id),
    }))
}
