//! Document lifecycle rules.
//!
//! ```text
//! PENDING -> PROCESSING -> PROCESSED | ERROR
//! PROCESSING -> PENDING            (infrastructure failure, cancellation, crash recovery)
//! PROCESSED | ERROR -> PENDING     (explicit reset)
//! ```
//!
//! Every transition is one conditional update that also moves `updated_at`.

use chrono::Utc;
use tracing::info;

use super::KnowledgeService;
use crate::db::{DocumentStatus, StatusTransition};
use crate::error::{ServiceError, ServiceResult};

/// Used when a failure carries no message of its own
const FALLBACK_ERROR_MESSAGE: &str = "Document processing failed";

/// Whether `from -> to` is an edge of the lifecycle
pub fn is_allowed(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Processed)
            | (Processing, Error)
            | (Processing, Pending)
            | (Processed, Pending)
            | (Error, Pending)
    )
}

/// Bound an error message for storage. Never returns an empty string.
pub fn truncate_error_message(message: &str, max_chars: usize) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return FALLBACK_ERROR_MESSAGE.to_string();
    }

    let max_chars = max_chars.max(1);
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let mut cut: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

impl KnowledgeService {
    /// Apply a guarded status change.
    ///
    /// A message is stored only when moving to ERROR, where it is required.
    pub(crate) fn transition(
        &self,
        document_id: &str,
        from: DocumentStatus,
        to: DocumentStatus,
        error_message: Option<&str>,
    ) -> ServiceResult<StatusTransition> {
        if !is_allowed(from, to) {
            return Err(ServiceError::InvalidTransition {
                document_id: document_id.to_string(),
                from,
                to,
            });
        }

        let message = match to {
            DocumentStatus::Error => Some(truncate_error_message(
                error_message.unwrap_or_default(),
                self.config.ingestion.max_error_message_chars,
            )),
            _ => None,
        };

        let outcome = self.db.transition_document_status(
            document_id,
            from,
            to,
            message.as_deref(),
            Utc::now(),
        )?;

        match outcome {
            StatusTransition::Applied => {
                info!(doc_id = %document_id, from = %from, to = %to, "Document status changed");
            }
            StatusTransition::Conflict(current) => {
                info!(
                    doc_id = %document_id,
                    expected = %from,
                    current = %current,
                    to = %to,
                    "Document status change skipped"
                );
            }
            StatusTransition::NotFound => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::TestHarness;

    #[test]
    fn test_lifecycle_edges() {
        use DocumentStatus::*;
        assert!(is_allowed(Pending, Processing));
        assert!(is_allowed(Processing, Error));
        assert!(is_allowed(Error, Pending));

        // Terminal states only regress through an explicit reset to PENDING
        assert!(!is_allowed(Processed, Processing));
        assert!(!is_allowed(Error, Processed));
        assert!(!is_allowed(Pending, Processed));
        assert!(!is_allowed(Pending, Error));
    }

    #[test]
    fn test_truncate_error_message() {
        assert_eq!(truncate_error_message("  boom  ", 100), "boom");
        assert_eq!(truncate_error_message("", 100), FALLBACK_ERROR_MESSAGE);
        assert_eq!(truncate_error_message("   ", 100), FALLBACK_ERROR_MESSAGE);

        let cut = truncate_error_message("abcdefghij", 5);
        assert_eq!(cut.chars().count(), 5);
        assert!(cut.starts_with("abcd"));
    }

    #[tokio::test]
    async fn test_error_transition_always_records_message() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;

        harness
            .service
            .transition(&doc.id, DocumentStatus::Pending, DocumentStatus::Processing, None)
            .unwrap();
        harness
            .service
            .transition(&doc.id, DocumentStatus::Processing, DocumentStatus::Error, None)
            .unwrap();

        let stored = harness.service.get_document(&doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some(FALLBACK_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_disallowed_edge_never_reaches_database() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;

        let err = harness
            .service
            .transition(&doc.id, DocumentStatus::Pending, DocumentStatus::Processed, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        assert_eq!(
            harness.service.get_document(&doc.id).unwrap().status,
            DocumentStatus::Pending
        );
    }
}
