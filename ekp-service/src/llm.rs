//! Language model capability.
//!
//! The QA path only needs "prompt in, answer and usage out", plus text
//! embeddings for ranking passages. Backends implement [`LanguageModel`];
//! timeouts, telemetry and retry live above this trait in the service layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OllamaConfig;
use crate::error::ModelError;

/// Prompt sent to the model: a system instruction plus the user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPrompt {
    pub system: String,
    pub user: String,
}

/// Per-call generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// `None` when embeddings are disabled
    pub embedding_model: Option<String>,
}

impl ModelSettings {
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout(),
            embedding_model: config
                .embedding_model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        }
    }
}

/// A generated answer with usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCompletion {
    pub text: String,
    pub tokens_used: u32,
    /// Model that actually answered, as reported by the backend
    pub model_id: String,
}

/// Trait for LLM backends
///
/// Implementations:
/// - `OllamaClient`: local Ollama server
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate one answer. Must not retry internally.
    async fn complete(
        &self,
        prompt: &ModelPrompt,
        settings: &ModelSettings,
    ) -> Result<ModelCompletion, ModelError>;

    /// Embed one text. Must not retry internally.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}
