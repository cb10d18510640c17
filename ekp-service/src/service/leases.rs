//! Per-document processing leases.
//!
//! At most one ingestion run holds a document at a time. The lease is an
//! in-process marker; the conditional status update in the database is the
//! second guard, so a lease plus `PENDING -> PROCESSING` is required to run.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Registry of held leases, each carrying a cancellation token
#[derive(Clone, Default)]
pub(crate) struct LeaseRegistry {
    active: Arc<DashMap<String, CancellationToken>>,
}

impl LeaseRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Take the lease for a document, or `None` if another run holds it
    pub(crate) fn try_acquire(&self, document_id: &str) -> Option<ProcessingLease> {
        match self.active.entry(document_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Some(ProcessingLease {
                    document_id: document_id.to_string(),
                    token,
                    registry: Arc::clone(&self.active),
                })
            }
        }
    }

    pub(crate) fn is_held(&self, document_id: &str) -> bool {
        self.active.contains_key(document_id)
    }

    /// Ask every running ingestion to stop at its next checkpoint
    pub(crate) fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.active.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(count = cancelled, "Document processing cancellation triggered");
        }
        cancelled
    }
}

/// Exclusive hold on one document. Released on drop.
pub(crate) struct ProcessingLease {
    document_id: String,
    token: CancellationToken,
    registry: Arc<DashMap<String, CancellationToken>>,
}

impl ProcessingLease {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ProcessingLease {
    fn drop(&mut self) {
        self.registry.remove(&self.document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let registry = LeaseRegistry::new();

        let lease = registry.try_acquire("doc").unwrap();
        assert!(registry.try_acquire("doc").is_none());
        assert!(registry.is_held("doc"));

        // Other documents are independent
        let other = registry.try_acquire("other").unwrap();
        assert!(registry.is_held("other"));

        drop(lease);
        assert!(!registry.is_held("doc"));
        assert!(registry.try_acquire("doc").is_some());
        drop(other);
    }

    #[test]
    fn test_cancel_all_signals_holders() {
        let registry = LeaseRegistry::new();
        let lease = registry.try_acquire("doc").unwrap();

        assert_eq!(registry.cancel_all(), 1);
        assert!(lease.token().is_cancelled());
    }
}
