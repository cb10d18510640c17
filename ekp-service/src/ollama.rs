use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::OllamaConfig;
use crate::error::{ModelError, ServiceError, ServiceResult};
use crate::llm::{LanguageModel, ModelCompletion, ModelPrompt, ModelSettings};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &OllamaConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Model(ModelError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn send_error(&self, url: &str, settings: &ModelSettings, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                model: settings.model.clone(),
                timeout_ms: settings.timeout.as_millis() as u64,
            }
        } else {
            ModelError::Connection {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(
        &self,
        prompt: &ModelPrompt,
        settings: &ModelSettings,
    ) -> Result<ModelCompletion, ModelError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaChatRequest {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage::new("system", &prompt.system),
                ChatMessage::new("user", &prompt.user),
            ],
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(settings.temperature),
                num_predict: Some(settings.max_tokens),
            }),
        };

        let response = self
            .client
            .post(&url)
            .timeout(settings.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(&url, settings, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model") && message.contains("not found") {
                return Err(ModelError::ModelNotFound {
                    model: settings.model.clone(),
                });
            }

            return Err(ModelError::Generation { status, message });
        }

        let chat_response: OllamaChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.send_error(&url, settings, e)
            } else {
                ModelError::InvalidResponse {
                    message: e.to_string(),
                }
            }
        })?;

        completion_from_response(chat_response, &settings.model)
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let request = OllamaEmbeddingRequest {
            model: model.to_string(),
            prompt: text.to_string(),
        };

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout {
                    model: model.to_string(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }
            } else {
                ModelError::Connection {
                    url: url.clone(),
                    source: e,
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model")
                && (message.contains("not found") || message.contains("does not exist"))
            {
                return Err(ModelError::ModelNotFound {
                    model: model.to_string(),
                });
            }

            return Err(ModelError::Generation { status, message });
        }

        let embedding_response: OllamaEmbeddingResponse =
            response.json().await.map_err(|e| ModelError::InvalidResponse {
                message: e.to_string(),
            })?;

        embedding_from_response(embedding_response, model)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

fn completion_from_response(
    response: OllamaChatResponse,
    requested_model: &str,
) -> Result<ModelCompletion, ModelError> {
    let text = response.message.content.trim().to_string();
    if text.is_empty() {
        return Err(ModelError::EmptyAnswer {
            model: requested_model.to_string(),
        });
    }

    let model_id = if response.model.is_empty() {
        requested_model.to_string()
    } else {
        response.model
    };

    Ok(ModelCompletion {
        text,
        tokens_used: response
            .prompt_eval_count
            .unwrap_or(0)
            .saturating_add(response.eval_count.unwrap_or(0)),
        model_id,
    })
}

fn embedding_from_response(
    response: OllamaEmbeddingResponse,
    model: &str,
) -> Result<Vec<f32>, ModelError> {
    if response.embedding.is_empty() {
        return Err(ModelError::InvalidResponse {
            message: format!("empty embedding from {}", model),
        });
    }
    Ok(response.embedding)
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

// Internal Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
