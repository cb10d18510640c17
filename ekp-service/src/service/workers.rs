//! Background ingestion of pending documents.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::format_error_chain_ref;
use crate::service::KnowledgeService;

/// Handle to a running worker
pub struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
    service: Arc<KnowledgeService>,
}

impl WorkerHandle {
    /// Stop polling, cancel in-flight runs and wait for the worker to exit.
    /// Interrupted documents go back to `PENDING`.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.service.leases.cancel_all();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Ingestion worker panicked");
        }
        info!("Ingestion worker stopped");
    }
}

impl KnowledgeService {
    /// Start the ingestion worker. Call once on server startup, after
    /// interrupted documents have been recovered.
    pub fn start_ingestion_worker(service: Arc<KnowledgeService>) -> WorkerHandle {
        let token = CancellationToken::new();
        let poll_interval = service.config.ingestion.worker_poll_interval();

        let handle = tokio::spawn({
            let service = Arc::clone(&service);
            let token = token.clone();
            async move {
                info!("Ingestion worker started");
                while !token.is_cancelled() {
                    let idle = service.ingest_next().await;
                    if idle && sleep_or_cancel(&token, poll_interval).await {
                        break;
                    }
                }
            }
        });

        WorkerHandle {
            token,
            handle,
            service,
        }
    }

    /// Ingest the oldest pending document. Returns true when the worker
    /// should wait before polling again.
    ///
    /// Documents whose last run failed on infrastructure are passed over:
    /// ingestion is never retried on its own. An explicit ingest or reset
    /// brings them back.
    async fn ingest_next(self: &Arc<Self>) -> bool {
        let skip = self.failures.document_ids();
        let doc = match self.db.get_next_pending_document(&skip) {
            Ok(Some(doc)) => doc,
            Ok(None) => return true,
            Err(e) => {
                error!(error = %format_error_chain_ref(&e), "Failed to check for pending documents");
                return true;
            }
        };

        info!(doc_id = %doc.id, title = %doc.title, "Processing queued document");
        match self.ingest(&doc.id).await {
            Ok(_) => false,
            Err(e) => {
                warn!(doc_id = %doc.id, error = %format_error_chain_ref(&e), "Queued document not ingested");
                true
            }
        }
    }
}

/// Returns true if cancelled before the delay elapsed
async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DocumentStatus;
    use crate::service::testing::TestHarness;

    async fn wait_for_status(harness: &TestHarness, id: &str, status: DocumentStatus) {
        for _ in 0..200 {
            if harness.service.get_document(id).unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("document {} never reached {}", id, status);
    }

    #[tokio::test]
    async fn test_worker_drains_pending_documents() {
        let harness = TestHarness::new();
        let good = harness.upload("a.txt", b"hello").await;
        let bad = harness.upload("b.pdf", b"nope").await;

        let worker = KnowledgeService::start_ingestion_worker(harness.service.clone());
        wait_for_status(&harness, &good.id, DocumentStatus::Processed).await;
        wait_for_status(&harness, &bad.id, DocumentStatus::Error).await;
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_next_reports_idle() {
        let harness = TestHarness::new();
        assert!(harness.service.ingest_next().await);

        harness.upload("a.txt", b"hello").await;
        assert!(!harness.service.ingest_next().await);
        assert!(harness.service.ingest_next().await);
    }

    #[tokio::test]
    async fn test_failed_run_backs_off() {
        let harness = TestHarness::new();
        let doc = harness.upload("a.txt", b"hello").await;
        harness.blobs.fail_reads(true);

        assert!(harness.service.ingest_next().await);
        assert_eq!(
            harness.service.get_document(&doc.id).unwrap().status,
            DocumentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_failed_document_does_not_block_the_queue() {
        let harness = TestHarness::new();
        let stuck = harness.upload("a.txt", b"first").await;
        let next = harness.upload("b.txt", b"second").await;
        harness.blobs.fail_reads_of(&stuck.file_path, true);

        for _ in 0..4 {
            harness.service.ingest_next().await;
        }

        let status = |id: &str| harness.service.get_document(id).unwrap().status;
        assert_eq!(status(&next.id), DocumentStatus::Processed);
        assert_eq!(status(&stuck.id), DocumentStatus::Pending);
        // One attempt each: the failed document is not retried
        assert_eq!(harness.blobs.read_count(), 2);
        assert!(harness.service.last_ingest_failure(&stuck.id).is_some());

        // A reset hands it back to the worker
        harness.blobs.fail_reads_of(&stuck.file_path, false);
        harness.service.reset_document(&stuck.id).unwrap();
        assert!(!harness.service.ingest_next().await);
        assert_eq!(status(&stuck.id), DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_worker() {
        let harness = TestHarness::new();
        let worker = KnowledgeService::start_ingestion_worker(harness.service.clone());
        tokio::time::timeout(Duration::from_secs(5), worker.shutdown())
            .await
            .unwrap();
    }
}
