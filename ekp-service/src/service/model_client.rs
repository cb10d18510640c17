//! Model invocation with a deadline and call telemetry.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::llm::{LanguageModel, ModelCompletion, ModelPrompt, ModelSettings};

/// Wraps a [`LanguageModel`] backend.
///
/// Every call is bounded by `settings.timeout` and its duration is recorded
/// whatever the outcome. Retrying is left to the caller.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn LanguageModel>,
    settings: ModelSettings,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn LanguageModel>, settings: ModelSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Configured model id
    pub fn model_id(&self) -> &str {
        &self.settings.model
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Whether chunks and questions are embedded for retrieval
    pub fn embeddings_enabled(&self) -> bool {
        self.settings.embedding_model.is_some()
    }

    /// Embed a text with the configured embedding model under the call
    /// deadline. `Ok(None)` when embeddings are disabled.
    pub async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, ModelError> {
        let Some(model) = self.settings.embedding_model.as_deref() else {
            return Ok(None);
        };
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.settings.timeout,
            self.backend.embed(model, text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                model: model.to_string(),
                timeout_ms: self.settings.timeout.as_millis() as u64,
            }),
        };

        histogram!("ekp_embedding_call_duration_seconds").record(started.elapsed());
        let outcome = if result.is_ok() { "success" } else { "error" };
        counter!("ekp_embedding_calls_total", "outcome" => outcome).increment(1);
        debug!(
            backend = self.backend.name(),
            model,
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding call finished"
        );

        result.map(Some)
    }

    pub async fn invoke(&self, prompt: &ModelPrompt) -> Result<ModelCompletion, ModelError> {
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.settings.timeout,
            self.backend.complete(prompt, &self.settings),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                model: self.settings.model.clone(),
                timeout_ms: self.settings.timeout.as_millis() as u64,
            }),
        };

        let elapsed = started.elapsed();
        histogram!("ekp_model_call_duration_seconds").record(elapsed);

        let outcome = match &result {
            Ok(_) => "success",
            Err(ModelError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        counter!("ekp_model_calls_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(completion) => info!(
                backend = self.backend.name(),
                model = %completion.model_id,
                tokens = completion.tokens_used,
                elapsed_ms = elapsed.as_millis() as u64,
                "Model call completed"
            ),
            Err(e) => warn!(
                backend = self.backend.name(),
                model = %self.settings.model,
                outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Model call failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OllamaConfig;
    use crate::service::testing::{StubModel, StubReply, stub_embedding};
    use std::time::Duration;

    fn settings(timeout: Duration) -> ModelSettings {
        ModelSettings {
            timeout,
            ..ModelSettings::from_config(&OllamaConfig::default())
        }
    }

    fn prompt() -> ModelPrompt {
        ModelPrompt {
            system: "s".to_string(),
            user: "u".to_string(),
        }
    }

    #[tokio::test]
    async fn test_invoke_returns_completion() {
        let stub = Arc::new(StubModel::scripted([StubReply::Answer("42".to_string())]));
        let client = ModelClient::new(stub.clone(), settings(Duration::from_secs(5)));

        let completion = client.invoke(&prompt()).await.unwrap();
        assert_eq!(completion.text, "42");
        assert_eq!(completion.model_id, client.model_id());
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let stub = Arc::new(StubModel::new().with_delay(Duration::from_secs(60)));
        let client = ModelClient::new(stub.clone(), settings(Duration::from_millis(50)));

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout { timeout_ms: 50, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_embed_follows_configured_model() {
        let stub = Arc::new(StubModel::new());
        let client = ModelClient::new(stub.clone(), settings(Duration::from_secs(5)));
        assert!(client.embeddings_enabled());
        let embedding = client.embed("reactor halt").await.unwrap().unwrap();
        assert_eq!(embedding, stub_embedding("reactor halt"));

        let disabled = ModelClient::new(
            stub.clone(),
            ModelSettings {
                embedding_model: None,
                ..settings(Duration::from_secs(5))
            },
        );
        assert!(!disabled.embeddings_enabled());
        assert!(disabled.embed("reactor").await.unwrap().is_none());
        assert_eq!(stub.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_not_retried() {
        let stub = Arc::new(StubModel::scripted([StubReply::Generation("boom".to_string())]));
        let client = ModelClient::new(stub.clone(), settings(Duration::from_secs(5)));

        let err = client.invoke(&prompt()).await.unwrap_err();
        assert!(matches!(err, ModelError::Generation { .. }));
        assert_eq!(stub.calls(), 1);
    }
}
