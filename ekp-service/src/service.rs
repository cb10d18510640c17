//! Document pipeline and question answering core.
//!
//! `KnowledgeService` is split across submodules by concern:
//! - `state_machine`: guarded document status transitions
//! - `leases`: per-document exclusive processing leases
//! - `failures`: infrastructure failures of aborted ingestion runs
//! - `pipeline`: the ingestion driver
//! - `documents`: upload, reads, reset, delete and startup recovery
//! - `context`: passage selection for a question
//! - `model_client`: timed, measured model invocation
//! - `qa`: the question answering orchestrator
//! - `workers`: background ingestion of pending documents

mod context;
mod documents;
mod failures;
mod leases;
mod model_client;
mod pipeline;
mod prompts;
mod qa;
mod state_machine;
mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{ContextBundle, ContextPassage};
pub use failures::IngestFailure;
pub use model_client::ModelClient;
pub use prompts::build_prompt;
pub use workers::WorkerHandle;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::llm::{LanguageModel, ModelSettings};
use crate::ollama::OllamaClient;
use crate::storage::{BlobStore, LocalBlobStore};
use failures::FailureRegistry;
use leases::LeaseRegistry;

/// Main service coordinator
pub struct KnowledgeService {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub blobs: Arc<dyn BlobStore>,
    pub model: ModelClient,
    leases: LeaseRegistry,
    failures: FailureRegistry,
}

impl KnowledgeService {
    /// Assemble a service from already constructed collaborators
    pub fn new(
        config: AppConfig,
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        backend: Arc<dyn LanguageModel>,
    ) -> Self {
        let model = ModelClient::new(backend, ModelSettings::from_config(&config.ollama));

        Self {
            config: Arc::new(config),
            db,
            blobs,
            model,
            leases: LeaseRegistry::new(),
            failures: FailureRegistry::new(),
        }
    }

    /// Open the database and blob store under `storage.data_dir` and connect
    /// to the configured Ollama server
    pub async fn from_config(config: AppConfig) -> crate::error::ServiceResult<Self> {
        info!("Initializing EKP service");

        let db_path = config.storage.database_path();
        let db = Arc::new(Database::open(&db_path)?);
        info!(path = %db_path.display(), "Database initialized");

        let blobs = Arc::new(LocalBlobStore::new(config.storage.blob_dir())?);
        info!(root = %blobs.root().display(), "Blob store initialized");

        let ollama = Arc::new(OllamaClient::new(&config.ollama)?);
        if ollama.health_check().await {
            info!(url = %config.ollama.base_url, "Ollama is available");
        } else {
            warn!(url = %config.ollama.base_url, "Ollama is not available");
        }

        Ok(Self::new(config, db, blobs, ollama))
    }
}
