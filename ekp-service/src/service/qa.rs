//! Question answering orchestrator.

use chrono::Utc;
use metrics::counter;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::KnowledgeService;
use super::documents::{MAX_PAGE_SIZE, validate_document_id};
use super::prompts::build_prompt;
use crate::db::QaSession;
use crate::error::{ModelError, ServiceError, ServiceResult};
use crate::llm::{ModelCompletion, ModelPrompt};

impl KnowledgeService {
    /// Answer a question, optionally scoped to one document, and record it.
    ///
    /// Only complete answers are stored. Validation, context and model
    /// failures return an error and leave no session behind.
    pub async fn answer(
        &self,
        user_id: &str,
        question: &str,
        document_id: Option<&str>,
    ) -> ServiceResult<QaSession> {
        let user_id = user_id.trim();
        let question = question.trim();
        self.validate_question(user_id, question, document_id)?;

        let started = Instant::now();

        let context = self.resolve_context(question, document_id).await?;
        let prompt = build_prompt(question, &context);
        let completion = self.invoke_with_retry(&prompt).await?;

        let session = QaSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            document_id: document_id.map(str::to_string),
            question: question.to_string(),
            answer: Some(completion.text),
            model_used: Some(completion.model_id),
            tokens_used: completion.tokens_used,
            response_time_ms: started.elapsed().as_millis() as u64,
            sources: context.sources(),
            created_at: Utc::now(),
        };
        self.db.insert_qa_session(&session)?;

        counter!("ekp_qa_sessions_total").increment(1);
        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            doc_id = ?session.document_id,
            tokens = session.tokens_used,
            elapsed_ms = session.response_time_ms,
            "Question answered"
        );

        Ok(session)
    }

    fn validate_question(
        &self,
        user_id: &str,
        question: &str,
        document_id: Option<&str>,
    ) -> ServiceResult<()> {
        if user_id.is_empty() {
            return Err(ServiceError::Validation {
                message: "user id is required".to_string(),
            });
        }
        if question.is_empty() {
            return Err(ServiceError::Validation {
                message: "question must not be empty".to_string(),
            });
        }
        let max_chars = self.config.qa.max_question_chars;
        if question.chars().count() > max_chars {
            return Err(ServiceError::Validation {
                message: format!("question exceeds {} characters", max_chars),
            });
        }
        if let Some(id) = document_id {
            validate_document_id(id)?;
        }
        Ok(())
    }

    /// Call the model, retrying timeouts and connection failures up to
    /// `qa.max_model_attempts` calls in total
    async fn invoke_with_retry(&self, prompt: &ModelPrompt) -> Result<ModelCompletion, ModelError> {
        let max_attempts = self.config.qa.max_model_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.model.invoke(prompt).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "Retrying model call");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn get_qa_session(&self, session_id: &str) -> ServiceResult<QaSession> {
        self.db
            .get_qa_session(session_id)?
            .ok_or_else(|| ServiceError::QaSessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Sessions newest first, optionally filtered by user and document
    pub fn list_qa_sessions(
        &self,
        user_id: Option<&str>,
        document_id: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> ServiceResult<Vec<QaSession>> {
        self.db.list_qa_sessions(
            user_id,
            document_id,
            offset,
            limit.clamp(1, MAX_PAGE_SIZE),
        )
    }
}
