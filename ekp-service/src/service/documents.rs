//! Document upload, reads, reset and delete.

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use super::KnowledgeService;
use super::failures::IngestFailure;
use crate::db::{Document, DocumentChunk, DocumentStatus, ExtractedText, StatusTransition};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::ingestion::FileType;

/// Largest page a list call returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Document ids are UUIDs; anything else is rejected before touching storage
pub(crate) fn validate_document_id(document_id: &str) -> ServiceResult<()> {
    Uuid::parse_str(document_id)
        .map(|_| ())
        .map_err(|_| ServiceError::Validation {
            message: format!("invalid document id: {:?}", document_id),
        })
}

impl KnowledgeService {
    /// Store an upload and create its `PENDING` record.
    ///
    /// The type comes from the file extension; an empty title falls back to
    /// the file name. The background worker (or an explicit ingest call)
    /// picks the document up from there.
    pub async fn create_document(
        &self,
        title: Option<&str>,
        filename: &str,
        content: &[u8],
        created_by: Option<&str>,
    ) -> ServiceResult<Document> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ServiceError::Validation {
                message: "filename is required".to_string(),
            });
        }

        let file_type = FileType::from_filename(filename)?;

        let max_size = self.config.ingestion.max_document_size_bytes;
        let size = content.len() as u64;
        if size > max_size {
            return Err(ServiceError::PayloadTooLarge { limit: max_size });
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(filename);

        let doc_id = Uuid::new_v4().to_string();
        let reference = self.blobs.put(&doc_id, filename, content).await?;

        let document = Document::new_pending(
            doc_id.clone(),
            title.to_string(),
            reference.clone(),
            size,
            file_type.as_str().to_string(),
            created_by.map(str::to_string),
        );

        if let Err(e) = self.db.insert_document(&document) {
            if let Err(cleanup_err) = self.blobs.delete(&reference).await {
                warn!(doc_id = %doc_id, error = %format_error_chain_ref(&cleanup_err), "Failed to remove orphaned upload");
            }
            return Err(e);
        }

        counter!("ekp_documents_uploaded_total").increment(1);
        info!(
            doc_id = %doc_id,
            title = %document.title,
            file_type = %file_type,
            bytes = size,
            "Document uploaded"
        );

        Ok(document)
    }

    /// Get a document by id
    pub fn get_document(&self, document_id: &str) -> ServiceResult<Document> {
        validate_document_id(document_id)?;
        self.db
            .get_document(document_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    /// List documents newest first with the total number matching `status`
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        offset: usize,
        limit: usize,
    ) -> ServiceResult<(Vec<Document>, usize)> {
        self.db
            .list_documents(status, offset, limit.clamp(1, MAX_PAGE_SIZE))
    }

    /// Extracted text of a processed document
    pub fn get_extracted_text(&self, document_id: &str) -> ServiceResult<ExtractedText> {
        let document = self.get_document(document_id)?;
        if document.status != DocumentStatus::Processed {
            return Err(ServiceError::DocumentNotReady {
                document_id: document.id,
                status: document.status,
            });
        }

        self.db
            .get_extracted_text(document_id)?
            .ok_or_else(|| ServiceError::Internal {
                message: format!("processed document {} has no extracted text", document_id),
            })
    }

    /// Chunks of a document in reading order
    pub fn get_document_chunks(&self, document_id: &str) -> ServiceResult<Vec<DocumentChunk>> {
        self.get_document(document_id)?;
        self.db.get_document_chunks(document_id)
    }

    /// Explicit re-ingestion request: `PROCESSED | ERROR -> PENDING`.
    ///
    /// Clears the error message and any recorded ingestion failure. A
    /// `PENDING` document is otherwise returned unchanged; a `PROCESSING` one
    /// is rejected.
    pub fn reset_document(&self, document_id: &str) -> ServiceResult<Document> {
        let document = self.get_document(document_id)?;

        if self.leases.is_held(document_id) || document.status == DocumentStatus::Processing {
            return Err(ServiceError::AlreadyProcessing {
                document_id: document_id.to_string(),
            });
        }
        if self.failures.clear(document_id) {
            info!(doc_id = %document_id, "Ingestion failure cleared");
        }
        if document.status == DocumentStatus::Pending {
            return Ok(document);
        }

        match self.transition(
            document_id,
            document.status,
            DocumentStatus::Pending,
            None,
        )? {
            StatusTransition::Applied | StatusTransition::Conflict(DocumentStatus::Pending) => {}
            StatusTransition::NotFound => {
                return Err(ServiceError::DocumentNotFound {
                    document_id: document_id.to_string(),
                });
            }
            StatusTransition::Conflict(DocumentStatus::Processing) => {
                return Err(ServiceError::AlreadyProcessing {
                    document_id: document_id.to_string(),
                });
            }
            StatusTransition::Conflict(current) => {
                return Err(ServiceError::InvalidTransition {
                    document_id: document_id.to_string(),
                    from: current,
                    to: DocumentStatus::Pending,
                });
            }
        }

        info!(doc_id = %document_id, previous = %document.status, "Document reset for re-ingestion");
        self.get_document(document_id)
    }

    /// Infrastructure failure of the document's last aborted ingestion run.
    /// Cleared by a successful run, a reset or deletion.
    pub fn last_ingest_failure(&self, document_id: &str) -> Option<IngestFailure> {
        self.failures.get(document_id)
    }

    /// Delete a document, its extracted text, chunks and upload.
    ///
    /// Rejected while an ingestion run holds it. QA sessions that reference
    /// the document are kept.
    pub async fn delete_document(&self, document_id: &str) -> ServiceResult<()> {
        let document = self.get_document(document_id)?;

        if self.leases.is_held(document_id) {
            return Err(ServiceError::AlreadyProcessing {
                document_id: document_id.to_string(),
            });
        }

        match self.db.delete_document(document_id)? {
            StatusTransition::Applied => {}
            StatusTransition::NotFound => {
                return Err(ServiceError::DocumentNotFound {
                    document_id: document_id.to_string(),
                });
            }
            StatusTransition::Conflict(_) => {
                return Err(ServiceError::AlreadyProcessing {
                    document_id: document_id.to_string(),
                });
            }
        }

        self.failures.clear(document_id);
        if let Err(e) = self.blobs.delete(&document.file_path).await {
            warn!(doc_id = %document_id, error = %format_error_chain_ref(&e), "Failed to delete stored upload");
        }

        info!(doc_id = %document_id, "Document deleted");
        Ok(())
    }

    /// Return documents left `PROCESSING` by a previous process to `PENDING`.
    /// Call once at startup, before any worker runs.
    pub fn recover_interrupted_documents(&self) -> ServiceResult<usize> {
        let recovered = self.db.reset_interrupted_documents(Utc::now())?;
        if recovered > 0 {
            warn!(count = recovered, "Recovered documents interrupted mid-processing");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::ExtractionError;
    use crate::service::testing::TestHarness;
    use crate::storage::BlobStore;

    #[tokio::test]
    async fn test_create_document_defaults() {
        let harness = TestHarness::new();
        let doc = harness
            .service
            .create_document(Some("  "), "Guide.MD", b"# Hi", Some("9"))
            .await
            .unwrap();

        assert_eq!(doc.title, "Guide.MD");
        assert_eq!(doc.file_type, "md");
        assert_eq!(doc.file_size, 4);
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.created_by.as_deref(), Some("9"));
        assert_eq!(harness.blobs.read(&doc.file_path).await.unwrap(), b"# Hi");
    }

    #[tokio::test]
    async fn test_create_document_rejects_bad_uploads() {
        let mut config = AppConfig::default();
        config.ingestion.max_document_size_bytes = 4;
        let harness = TestHarness::with_config(config);

        let unsupported = harness
            .service
            .create_document(None, "setup.exe", b"MZ", None)
            .await
            .unwrap_err();
        assert!(matches!(
            unsupported,
            ServiceError::Extraction(ExtractionError::UnsupportedType { .. })
        ));

        let too_large = harness
            .service
            .create_document(None, "big.txt", b"12345", None)
            .await
            .unwrap_err();
        assert!(matches!(too_large, ServiceError::PayloadTooLarge { limit: 4 }));

        let unnamed = harness
            .service
            .create_document(None, "  ", b"x", None)
            .await
            .unwrap_err();
        assert!(matches!(unnamed, ServiceError::Validation { .. }));

        let (docs, total) = harness.service.list_documents(None, 0, 10).unwrap();
        assert!(docs.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_error_and_allows_reingest() {
        let harness = TestHarness::new();
        let doc = harness.upload("bad.txt", b"\xFF\xFE").await;
        let failed = harness.service.ingest(&doc.id).await.unwrap();
        assert_eq!(failed.status, DocumentStatus::Error);

        let reset = harness.service.reset_document(&doc.id).unwrap();
        assert_eq!(reset.status, DocumentStatus::Pending);
        assert!(reset.error_message.is_none());

        // Resetting a pending document is a no-op
        let again = harness.service.reset_document(&doc.id).unwrap();
        assert_eq!(again.updated_at, reset.updated_at);
    }

    #[tokio::test]
    async fn test_reset_and_delete_rejected_while_processing() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;
        harness
            .service
            .transition(&doc.id, DocumentStatus::Pending, DocumentStatus::Processing, None)
            .unwrap();

        assert!(matches!(
            harness.service.reset_document(&doc.id),
            Err(ServiceError::AlreadyProcessing { .. })
        ));
        assert!(matches!(
            harness.service.delete_document(&doc.id).await,
            Err(ServiceError::AlreadyProcessing { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_upload() {
        let harness = TestHarness::new();
        let doc = harness.processed("a.txt", b"hello").await;

        harness.service.delete_document(&doc.id).await.unwrap();

        assert!(matches!(
            harness.service.get_document(&doc.id),
            Err(ServiceError::DocumentNotFound { .. })
        ));
        assert!(harness.blobs.read(&doc.file_path).await.is_err());
        assert!(matches!(
            harness.service.delete_document(&doc.id).await,
            Err(ServiceError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_text_of_unprocessed_document_is_not_ready() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;

        assert!(matches!(
            harness.service.get_extracted_text(&doc.id),
            Err(ServiceError::DocumentNotReady {
                status: DocumentStatus::Pending,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_recover_interrupted_documents() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;
        harness
            .service
            .transition(&doc.id, DocumentStatus::Pending, DocumentStatus::Processing, None)
            .unwrap();

        assert_eq!(harness.service.recover_interrupted_documents().unwrap(), 1);
        let recovered = harness.service.ingest(&doc.id).await.unwrap();
        assert_eq!(recovered.status, DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn test_list_documents_by_status() {
        let harness = TestHarness::new();
        harness.processed("a.txt", b"hello").await;
        harness.upload("b.txt", b"world").await;

        let (processed, total) = harness
            .service
            .list_documents(Some(DocumentStatus::Processed), 0, 10)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(processed[0].title, "a.txt");

        let (_, all) = harness.service.list_documents(None, 0, 0).unwrap();
        assert_eq!(all, 2);
    }
}
