//! Ingestion pipeline driver.
//!
//! One run: lease -> `PENDING -> PROCESSING` -> read blob -> extract -> chunk
//! -> embed -> replace stored text and chunks -> `PROCESSED`. Content failures
//! end in `ERROR` with the cause recorded on the document. Infrastructure
//! failures and cancellation return the document to `PENDING` and surface to
//! the caller, so a degraded system never shows up as a bad document; the
//! infrastructure failure is kept as the document's last ingest failure.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::KnowledgeService;
use super::documents::validate_document_id;
use super::leases::ProcessingLease;
use crate::db::{Document, DocumentChunk, DocumentStatus, StatusTransition};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::ingestion::{FileType, chunk_text, extract_from_store};

/// Whether a failure belongs to the document rather than the system
fn is_content_failure(error: &ServiceError) -> bool {
    matches!(error, ServiceError::Extraction(e) if e.is_content_error())
}

impl KnowledgeService {
    /// Ingest one document.
    ///
    /// Returns the document in its terminal state: `PROCESSED`, or `ERROR`
    /// for content problems. Fails with `AlreadyProcessing` if another run
    /// holds the document and `InvalidTransition` if it is not `PENDING`.
    ///
    /// The run itself is detached from the caller: dropping the returned
    /// future does not strand the document in `PROCESSING`.
    pub async fn ingest(self: &Arc<Self>, document_id: &str) -> ServiceResult<Document> {
        validate_document_id(document_id)?;
        let document = self.get_document(document_id)?;

        let lease = self.leases.try_acquire(document_id).ok_or_else(|| {
            ServiceError::AlreadyProcessing {
                document_id: document_id.to_string(),
            }
        })?;

        match self.transition(
            document_id,
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            None,
        )? {
            StatusTransition::Applied => {}
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
                    to: DocumentStatus::Processing,
                });
            }
        }

        let service = Arc::clone(self);
        match tokio::spawn(async move { service.run_ingestion(document, lease).await }).await {
            Ok(result) => result,
            Err(e) => {
                let error = ServiceError::Internal {
                    message: format!("Ingestion task failed: {}", e),
                };
                self.abandon_run(document_id, &error);
                Err(error)
            }
        }
    }

    /// Body of a run. The caller holds the lease and has moved the document
    /// to `PROCESSING`; the lease is released when this returns.
    async fn run_ingestion(&self, document: Document, lease: ProcessingLease) -> ServiceResult<Document> {
        let doc_id = document.id.clone();
        let started = Instant::now();
        info!(doc_id = %doc_id, title = %document.title, file_type = %document.file_type, "Ingestion started");

        let outcome = self.extract_and_index(&document, lease.token()).await;
        histogram!("ekp_ingestion_duration_seconds").record(started.elapsed());

        let finished = match outcome {
            Ok(chunk_count) => self.finish(&doc_id, DocumentStatus::Processed, None).map(|()| {
                counter!("ekp_documents_ingested_total", "outcome" => "processed").increment(1);
                info!(
                    doc_id = %doc_id,
                    chunks = chunk_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Ingestion completed"
                );
            }),
            Err(e) if is_content_failure(&e) => {
                let message = e.to_string();
                // No stale passages from an earlier run survive a failed one
                if let Err(clear_err) = self.db.clear_extraction(&doc_id) {
                    warn!(doc_id = %doc_id, error = %format_error_chain_ref(&clear_err), "Failed to clear previous extraction");
                }
                self.finish(&doc_id, DocumentStatus::Error, Some(&message)).map(|()| {
                    counter!("ekp_documents_ingested_total", "outcome" => "error").increment(1);
                    warn!(doc_id = %doc_id, error = %message, "Ingestion failed on document content");
                })
            }
            Err(e) => Err(e),
        };

        if let Err(e) = finished {
            self.abandon_run(&doc_id, &e);
            return Err(e);
        }

        self.failures.clear(&doc_id);
        drop(lease);
        self.get_document(&doc_id)
    }

    /// Return a run that could not reach a terminal state to `PENDING` and
    /// remember why, unless it was cancelled.
    fn abandon_run(&self, doc_id: &str, error: &ServiceError) {
        let cancelled = matches!(error, ServiceError::Cancelled { .. });
        let outcome = if cancelled { "cancelled" } else { "infrastructure" };
        counter!("ekp_documents_ingested_total", "outcome" => outcome).increment(1);
        error!(
            doc_id = %doc_id,
            outcome,
            error = %format_error_chain_ref(error),
            "Ingestion aborted, returning document to pending"
        );

        if !cancelled {
            self.failures.record(doc_id, error);
        }
        if let Err(revert_err) = self.finish(doc_id, DocumentStatus::Pending, None) {
            error!(doc_id = %doc_id, error = %format_error_chain_ref(&revert_err), "Failed to return document to pending");
        }
    }

    /// Extract, chunk, embed and persist. Returns the number of chunks stored.
    async fn extract_and_index(
        &self,
        document: &Document,
        token: &CancellationToken,
    ) -> ServiceResult<usize> {
        self.check_cancellation(&document.id, token)?;

        let file_type = FileType::parse(&document.file_type)?;
        let text = extract_from_store(self.blobs.as_ref(), &document.file_path, file_type).await?;

        self.check_cancellation(&document.id, token)?;

        let ingestion = &self.config.ingestion;
        let mut chunks: Vec<DocumentChunk> =
            chunk_text(&text, ingestion.chunk_size, ingestion.chunk_overlap)
                .into_iter()
                .map(|chunk| DocumentChunk {
                    id: Uuid::new_v4().to_string(),
                    document_id: document.id.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    token_count: chunk.token_count,
                    embedding: None,
                })
                .collect();

        self.embed_chunks(&document.id, &mut chunks, token).await?;

        self.db
            .replace_extraction(&document.id, &text, &chunks, Utc::now())?;

        Ok(chunks.len())
    }

    /// Attach embeddings to every chunk, or to none of them.
    ///
    /// An unavailable embedding model does not fail the run: the document is
    /// indexed without embeddings and questions about it are ranked by shared
    /// terms instead.
    async fn embed_chunks(
        &self,
        document_id: &str,
        chunks: &mut [DocumentChunk],
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        if !self.model.embeddings_enabled() || chunks.is_empty() {
            return Ok(());
        }

        let total = chunks.len();
        let mut embeddings = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            self.check_cancellation(document_id, token)?;

            match self.model.embed(&chunk.content).await {
                Ok(Some(embedding)) => embeddings.push(embedding),
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(
                        doc_id = %document_id,
                        error = %format_error_chain_ref(&e),
                        "Embedding failed, indexing without embeddings"
                    );
                    return Ok(());
                }
            }

            let progress = i + 1;
            if progress % 10 == 0 || progress == total {
                debug!(doc_id = %document_id, progress, total, "Generating embeddings");
            }
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
        Ok(())
    }

    /// Leave `PROCESSING`. Losing the document here means something outside
    /// the lease moved it, which is a bug rather than a user error.
    fn finish(
        &self,
        document_id: &str,
        to: DocumentStatus,
        error_message: Option<&str>,
    ) -> ServiceResult<()> {
        match self.transition(document_id, DocumentStatus::Processing, to, error_message)? {
            StatusTransition::Applied => Ok(()),
            StatusTransition::NotFound => Err(ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            }),
            StatusTransition::Conflict(current) => Err(ServiceError::Internal {
                message: format!(
                    "document {} left PROCESSING while leased (now {})",
                    document_id, current
                ),
            }),
        }
    }

    fn check_cancellation(&self, document_id: &str, token: &CancellationToken) -> ServiceResult<()> {
        if token.is_cancelled() {
            Err(ServiceError::Cancelled {
                document_id: document_id.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
