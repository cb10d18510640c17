use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DocumentStatus;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("QA session not found: {session_id}")]
    QaSessionNotFound { session_id: String },

    #[error("Document {document_id} is not ready for questions (status {status})")]
    DocumentNotReady {
        document_id: String,
        status: DocumentStatus,
    },

    #[error("Document {document_id} is already being processed")]
    AlreadyProcessing { document_id: String },

    #[error("Document {document_id} cannot move from {from} to {to}")]
    InvalidTransition {
        document_id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Processing of document {document_id} was cancelled")]
    Cancelled { document_id: String },

    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Document exceeds the upload limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Content extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported file type: {file_type}")]
    UnsupportedType { file_type: String },

    #[error("Corrupt {file_type} content: {message}")]
    Corrupt { file_type: String, message: String },

    #[error("Source file is unreadable: {message}")]
    Unreadable { message: String },

    #[error("No text could be extracted from {file_type} content")]
    Empty { file_type: String },

    #[error("{engine} extraction engine unavailable: {message}")]
    EngineUnavailable { engine: String, message: String },
}

impl ExtractionError {
    /// Whether the failure is caused by the document itself rather than the host
    pub fn is_content_error(&self) -> bool {
        !matches!(self, ExtractionError::EngineUnavailable { .. })
    }
}

/// Language model backend errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model {model} did not respond within {timeout_ms} ms")]
    Timeout { model: String, timeout_ms: u64 },

    #[error("Connection failed to model backend at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from model backend: {message}")]
    InvalidResponse { message: String },

    #[error("Model {model} returned an empty answer")]
    EmptyAnswer { model: String },
}

impl ModelError {
    /// Failures worth another attempt: the backend may answer next time
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout { .. } | ModelError::Connection { .. }
        )
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Corrupt row: {message}")]
    CorruptRow { message: String },
}

/// Blob store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {reference}")]
    NotFound { reference: String },

    #[error("Invalid blob reference: {reference}")]
    InvalidReference { reference: String },

    #[error("Blob store IO failure for {reference}")]
    Io {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    /// Whether the error signals a degraded system rather than a bad document or request
    pub fn is_infrastructure(&self) -> bool {
        match self {
            ServiceError::Database(_) | ServiceError::Internal { .. } => true,
            ServiceError::Storage(StorageError::Io { .. }) => true,
            ServiceError::Extraction(e) => !e.is_content_error(),
            ServiceError::Model(ModelError::Connection { .. }) => true,
            _ => false,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } | ServiceError::QaSessionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::DocumentNotReady { .. }
            | ServiceError::AlreadyProcessing { .. }
            | ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::Extraction(ExtractionError::UnsupportedType { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Model(ModelError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Model(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            e if e.is_infrastructure() => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::QaSessionNotFound { .. } => "qa_session_not_found",
            ServiceError::DocumentNotReady { .. } => "document_not_ready",
            ServiceError::AlreadyProcessing { .. } => "already_processing",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::Cancelled { .. } => "cancelled",
            ServiceError::Validation { .. } => "validation_error",
            ServiceError::PayloadTooLarge { .. } => "payload_too_large",
            ServiceError::Extraction(ExtractionError::UnsupportedType { .. }) => {
                "unsupported_type"
            }
            ServiceError::Extraction(ExtractionError::EngineUnavailable { .. }) => {
                "extraction_engine_unavailable"
            }
            ServiceError::Extraction(_) => "extraction_error",
            ServiceError::Model(ModelError::Timeout { .. }) => "model_timeout",
            ServiceError::Model(ModelError::Connection { .. }) => "model_connection",
            ServiceError::Model(ModelError::ModelNotFound { .. }) => "model_not_found",
            ServiceError::Model(_) => "model_error",
            ServiceError::Database(_) => "database_error",
            ServiceError::Storage(StorageError::NotFound { .. }) => "blob_not_found",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        if status.is_server_error() {
            tracing::warn!(code = %code, error = %format_error_chain_ref(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and its `source()` chain on one line for log fields
pub fn format_error_chain_ref(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        let db = ServiceError::Database(DatabaseError::Migration {
            message: "boom".to_string(),
        });
        assert!(db.is_infrastructure());

        let corrupt = ServiceError::Extraction(ExtractionError::Corrupt {
            file_type: "pdf".to_string(),
            message: "bad xref".to_string(),
        });
        assert!(!corrupt.is_infrastructure());

        let engine = ServiceError::Extraction(ExtractionError::EngineUnavailable {
            engine: "pdfium".to_string(),
            message: "missing library".to_string(),
        });
        assert!(engine.is_infrastructure());

        let not_ready = ServiceError::DocumentNotReady {
            document_id: "d".to_string(),
            status: DocumentStatus::Error,
        };
        assert!(!not_ready.is_infrastructure());
        assert_eq!(not_ready.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = ServiceError::Database(DatabaseError::Query(
            rusqlite::Error::InvalidColumnName("nope".to_string()),
        ));
        let rendered = format_error_chain_ref(&err);
        assert!(rendered.starts_with("Database error: Query failed"));
        assert!(rendered.contains("nope"));
    }

    #[test]
    fn test_model_transient_errors() {
        assert!(
            ModelError::Timeout {
                model: "m".to_string(),
                timeout_ms: 10
            }
            .is_transient()
        );
        assert!(
            !ModelError::ModelNotFound {
                model: "m".to_string()
            }
            .is_transient()
        );
    }
}
