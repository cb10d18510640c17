//! Context resolution for a question.
//!
//! Read-only: a document must be `PROCESSED` to be asked about. When its text
//! exceeds the character budget, chunks are ranked by cosine similarity of
//! their embeddings to the question's, or by how many of the question's
//! terms they contain when embeddings are unavailable, and the best ones are
//! kept in reading order.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::KnowledgeService;
use super::documents::validate_document_id;
use crate::db::{DocumentChunk, DocumentStatus};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::ingestion::is_cjk;

/// One passage of a document handed to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPassage {
    pub chunk_index: u32,
    pub content: String,
}

/// Everything the prompt builder needs to know about the context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextBundle {
    /// `None` for an open-domain question
    pub document_id: Option<String>,
    pub passages: Vec<ContextPassage>,
    /// Whether passages were dropped or cut to fit the budget
    pub truncated: bool,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Chunk indexes of the passages, in reading order
    pub fn sources(&self) -> Vec<u32> {
        self.passages.iter().map(|p| p.chunk_index).collect()
    }
}

impl KnowledgeService {
    /// Resolve the context a question is answered from.
    ///
    /// Fails with `DocumentNotReady` for a document that is not `PROCESSED`;
    /// without a document, fails with `Validation` if open-domain questions
    /// are disabled and otherwise returns an empty bundle.
    pub async fn resolve_context(
        &self,
        question: &str,
        document_id: Option<&str>,
    ) -> ServiceResult<ContextBundle> {
        let Some(document_id) = document_id else {
            if self.config.qa.require_document {
                return Err(ServiceError::Validation {
                    message: "a document id is required for questions".to_string(),
                });
            }
            return Ok(ContextBundle::default());
        };

        validate_document_id(document_id)?;
        let content = self
            .db
            .get_document_content(document_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })?;
        if content.status != DocumentStatus::Processed {
            return Err(ServiceError::DocumentNotReady {
                document_id: document_id.to_string(),
                status: content.status,
            });
        }

        let mut chunks = content.chunks;
        if chunks.is_empty() {
            // Text stored without an index still answers questions
            let text = content.text.ok_or_else(|| ServiceError::Internal {
                message: format!("processed document {} has no extracted text", document_id),
            })?;
            chunks.push(DocumentChunk {
                id: String::new(),
                document_id: document_id.to_string(),
                chunk_index: 0,
                content: text,
                token_count: 0,
                embedding: None,
            });
        }

        let budget = self.config.qa.max_context_chars;
        let total: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
        let query_embedding = if total > budget && chunks.iter().all(|c| c.embedding.is_some()) {
            self.embed_question(question).await
        } else {
            None
        };

        let (passages, truncated) =
            select_passages(question, chunks, budget, query_embedding.as_deref());
        debug!(
            doc_id = %document_id,
            passages = passages.len(),
            truncated,
            by_embedding = query_embedding.is_some(),
            "Context resolved"
        );

        Ok(ContextBundle {
            document_id: Some(document_id.to_string()),
            passages,
            truncated,
        })
    }

    /// Question embedding, or `None` to rank by shared terms
    async fn embed_question(&self, question: &str) -> Option<Vec<f32>> {
        match self.model.embed(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %format_error_chain_ref(&e), "Question embedding failed, ranking passages by shared terms");
                None
            }
        }
    }
}

/// Lowercased terms of a text; CJK characters are terms on their own
fn terms(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let mut current = String::new();
        for c in word.chars() {
            if is_cjk(c) {
                if !current.is_empty() {
                    out.insert(std::mem::take(&mut current));
                }
                out.insert(c.to_string());
            } else {
                current.extend(c.to_lowercase());
            }
        }
        if current.chars().count() > 1 {
            out.insert(current);
        }
    }
    out
}

fn overlap_score(question_terms: &HashSet<String>, content: &str) -> usize {
    terms(content)
        .iter()
        .filter(|t| question_terms.contains(*t))
        .count()
}

/// Cosine similarity of two vectors; 0 for mismatched or zero vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Relevance of each chunk to the question. Embedding similarity when the
/// question and every chunk are embedded, shared terms otherwise.
fn score_chunks(question: &str, chunks: &[DocumentChunk], query_embedding: Option<&[f32]>) -> Vec<f32> {
    let embedded: Option<Vec<&[f32]>> = chunks.iter().map(|c| c.embedding.as_deref()).collect();

    match (query_embedding, embedded) {
        (Some(query), Some(embeddings)) => embeddings
            .into_iter()
            .map(|e| cosine_similarity(query, e))
            .collect(),
        _ => {
            let question_terms = terms(question);
            chunks
                .iter()
                .map(|c| overlap_score(&question_terms, &c.content) as f32)
                .collect()
        }
    }
}

/// Pick the passages that fit `budget` characters.
///
/// Everything is kept when it fits. Otherwise chunks are taken by score
/// (ties broken by position) while they fit and returned in reading order.
/// If not even the best chunk fits, it is cut to the budget.
pub(crate) fn select_passages(
    question: &str,
    chunks: Vec<DocumentChunk>,
    budget: usize,
    query_embedding: Option<&[f32]>,
) -> (Vec<ContextPassage>, bool) {
    let total: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
    if total <= budget {
        let passages = chunks
            .into_iter()
            .map(|c| ContextPassage {
                chunk_index: c.chunk_index,
                content: c.content,
            })
            .collect();
        return (passages, false);
    }

    let scores = score_chunks(question, &chunks, query_embedding);
    let mut ranked: Vec<(f32, DocumentChunk)> = scores.into_iter().zip(chunks).collect();
    ranked.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then(a.chunk_index.cmp(&b.chunk_index)));

    let mut used = 0;
    let mut selected: Vec<ContextPassage> = Vec::new();
    for (_, chunk) in &ranked {
        let len = chunk.content.chars().count();
        if used + len <= budget {
            used += len;
            selected.push(ContextPassage {
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
            });
        }
    }

    if selected.is_empty() {
        if let Some((_, best)) = ranked.first() {
            selected.push(ContextPassage {
                chunk_index: best.chunk_index,
                content: best.content.chars().take(budget).collect(),
            });
        }
    }

    selected.sort_by_key(|p| p.chunk_index);
    (selected, true)
}
