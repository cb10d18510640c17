//! Service configuration.
//!
//! Values come from an optional `config.*` file in the working directory,
//! overridden by `EKP__SECTION__KEY` environment variables. Every field has a
//! default so the service starts with no configuration at all.

mod loader;

pub use loader::{load_config, load_config_from};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub qa: QaConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ekp.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,

    /// Chunk size in words
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Error messages recorded on a document are cut to this many characters
    #[serde(default = "default_max_error_message_chars")]
    pub max_error_message_chars: usize,

    /// Run the background worker that picks up pending documents
    #[serde(default = "default_worker_enabled")]
    pub worker_enabled: bool,

    #[serde(default = "default_worker_poll_interval_secs")]
    pub worker_poll_interval_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_document_size_bytes: default_max_document_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_error_message_chars: default_max_error_message_chars(),
            worker_enabled: default_worker_enabled(),
            worker_poll_interval_secs: default_worker_poll_interval_secs(),
        }
    }
}

impl IngestionConfig {
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_secs(self.worker_poll_interval_secs)
    }
}

/// Ollama LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used to embed chunks and questions for retrieval. Empty or
    /// absent disables embeddings and passages are ranked by shared terms.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            default_model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OllamaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Question answering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    /// Reject questions that are not scoped to a document
    #[serde(default)]
    pub require_document: bool,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,

    /// Total model calls per question; transient failures are retried up to this count
    #[serde(default = "default_max_model_attempts")]
    pub max_model_attempts: u32,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            require_document: false,
            max_context_chars: default_max_context_chars(),
            max_question_chars: default_max_question_chars(),
            max_model_attempts: default_max_model_attempts(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_document_size() -> u64 {
    50 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    64
}

fn default_max_error_message_chars() -> usize {
    1000
}

fn default_worker_enabled() -> bool {
    true
}

fn default_worker_poll_interval_secs() -> u64 {
    2
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_embedding_model() -> Option<String> {
    Some("nomic-embed-text".to_string())
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_context_chars() -> usize {
    8000
}

fn default_max_question_chars() -> usize {
    4000
}

fn default_max_model_attempts() -> u32 {
    1
}
