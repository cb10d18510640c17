//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Uploaded and waiting for ingestion
    #[default]
    Pending,
    /// An ingestion run holds the document
    Processing,
    /// Text extracted and indexed
    Processed,
    /// Ingestion failed; `error_message` says why
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Processed => "PROCESSED",
            DocumentStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(DocumentStatus::Pending),
            "PROCESSING" => Some(DocumentStatus::Processing),
            "PROCESSED" => Some(DocumentStatus::Processed),
            "ERROR" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Blob store reference for the original upload
    pub file_path: String,
    pub file_size: u64,
    /// Declared file type (lowercase extension)
    pub file_type: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns selected for `Document::from_row`, in order
pub(crate) const DOCUMENT_COLUMNS: &str = "id, title, file_path, file_size, file_type, status, error_message, created_by, created_at, updated_at";

impl Document {
    /// A freshly uploaded document awaiting ingestion
    pub fn new_pending(
        id: String,
        title: String,
        file_path: String,
        file_size: u64,
        file_type: String,
        created_by: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            file_path,
            file_size,
            file_type,
            status: DocumentStatus::Pending,
            error_message: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let file_size: i64 = row.get(3)?;
        let status_str: String = row.get(5)?;
        let status = DocumentStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown document status {status_str:?}").into(),
            )
        })?;

        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            file_path: row.get(2)?,
            file_size: file_size.max(0) as u64,
            file_type: row.get(4)?,
            status,
            error_message: row.get(6)?,
            created_by: row.get(7)?,
            created_at: parse_timestamp(row, 8)?,
            updated_at: parse_timestamp(row, 9)?,
        })
    }
}

/// Full extracted text of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub document_id: String,
    pub content: String,
    pub char_count: usize,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedText {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let char_count: i64 = row.get(2)?;
        Ok(Self {
            document_id: row.get(0)?,
            content: row.get(1)?,
            char_count: char_count.max(0) as usize,
            extracted_at: parse_timestamp(row, 3)?,
        })
    }
}

/// Indexed passage of a document's extracted text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub token_count: u32,
    /// Absent when the document was indexed without an embedding model
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

pub(crate) const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, content, token_count, embedding";

impl DocumentChunk {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let embedding: Option<Vec<u8>> = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            chunk_index: row.get(2)?,
            content: row.get(3)?,
            token_count: row.get(4)?,
            embedding: embedding.map(|bytes| decode_embedding(&bytes)),
        })
    }
}

/// Embeddings are stored as little-endian `f32`s
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// One question-answer exchange. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSession {
    pub id: String,
    pub user_id: String,
    /// Weak reference; the document may since have been re-ingested or deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub question: String,
    pub answer: Option<String>,
    pub model_used: Option<String>,
    pub tokens_used: u32,
    pub response_time_ms: u64,
    /// Indexes of the document chunks the answer was given from, in reading order
    #[serde(default)]
    pub sources: Vec<u32>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const QA_SESSION_COLUMNS: &str = "id, user_id, document_id, question, answer, model_used, tokens_used, response_time_ms, created_at, sources";

impl QaSession {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let response_time_ms: i64 = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            document_id: row.get(2)?,
            question: row.get(3)?,
            answer: row.get(4)?,
            model_used: row.get(5)?,
            tokens_used: row.get(6)?,
            response_time_ms: response_time_ms.max(0) as u64,
            sources: parse_json(row, 9)?,
            created_at: parse_timestamp(row, 8)?,
        })
    }
}

/// Canonical timestamp encoding. Fixed width so SQL string comparison orders correctly.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
