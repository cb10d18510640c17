//! Infrastructure failures of ingestion runs.
//!
//! A run that aborts on a degraded system leaves its document `PENDING` with
//! no user-facing error. The failure is kept here instead, so callers can see
//! it and the worker does not pick the document up again on its own.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ServiceError;

/// Last aborted run of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    /// Stable machine code of the error, as in API error bodies
    pub code: String,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

impl IngestFailure {
    fn from_error(error: &ServiceError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct FailureRegistry {
    last: Arc<DashMap<String, IngestFailure>>,
}

impl FailureRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, document_id: &str, error: &ServiceError) {
        self.last
            .insert(document_id.to_string(), IngestFailure::from_error(error));
    }

    pub(crate) fn clear(&self, document_id: &str) -> bool {
        self.last.remove(document_id).is_some()
    }

    pub(crate) fn get(&self, document_id: &str) -> Option<IngestFailure> {
        self.last.get(document_id).map(|entry| entry.value().clone())
    }

    /// Documents the worker leaves alone until someone asks for them again
    pub(crate) fn document_ids(&self) -> Vec<String> {
        self.last.iter().map(|entry| entry.key().clone()).collect()
    }
}
