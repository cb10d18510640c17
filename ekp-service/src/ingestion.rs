//! Content extraction.
//!
//! Turns the bytes of an uploaded file into plain UTF-8 text. One extractor
//! per supported [`FileType`]; unsupported types fail fast at parse time.

pub mod chunking;
pub mod docx;
pub mod markdown;
pub mod pdf;
pub mod text;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{ExtractionError, ServiceError, ServiceResult, StorageError};
use crate::storage::BlobStore;

pub use chunking::{TextChunk, chunk_text, estimate_token_count, is_cjk};

/// Supported upload types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Md,
}

impl FileType {
    /// Parse a declared type such as `pdf`, `.PDF` or `markdown`
    pub fn parse(declared: &str) -> Result<Self, ExtractionError> {
        let normalized = declared.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            "txt" | "text" => Ok(FileType::Txt),
            "md" | "markdown" => Ok(FileType::Md),
            _ => Err(ExtractionError::UnsupportedType {
                file_type: declared.to_string(),
            }),
        }
    }

    /// Infer the type from a file name's extension
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ExtractionError::UnsupportedType {
                file_type: filename.to_string(),
            })?;
        Self::parse(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Md => "md",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces UTF-8 text from the bytes of one file type
pub trait ContentExtractor: Send + Sync {
    fn file_type(&self) -> FileType;

    fn extract(&self, data: &[u8]) -> Result<String, ExtractionError>;
}

/// A document section, optionally titled by its heading
#[derive(Debug, Clone)]
pub struct Section {
    pub title: Option<String>,
    pub content: String,
}

/// Pick the extractor for a file type
pub fn extractor_for(file_type: FileType) -> Box<dyn ContentExtractor> {
    match file_type {
        FileType::Pdf => Box::new(pdf::PdfExtractor),
        FileType::Docx => Box::new(docx::DocxExtractor),
        FileType::Txt => Box::new(text::PlainTextExtractor),
        FileType::Md => Box::new(markdown::MarkdownExtractor),
    }
}

/// Extract text from bytes of the given type.
///
/// Blocking: PDF and DOCX decoding is CPU bound. Async callers go through
/// [`extract_from_store`].
pub fn extract(data: &[u8], file_type: FileType) -> Result<String, ExtractionError> {
    let extractor = extractor_for(file_type);
    let text = extractor.extract(data)?;
    let text = text.trim();

    if text.is_empty() {
        return Err(ExtractionError::Empty {
            file_type: extractor.file_type().to_string(),
        });
    }

    debug!(file_type = %file_type, bytes = data.len(), chars = text.chars().count(), "Extracted text");
    Ok(text.to_string())
}

/// Read a blob and extract its text off the async runtime.
///
/// A missing blob is a property of the document (its source is gone) and
/// reported as [`ExtractionError::Unreadable`]; other store failures pass
/// through as infrastructure errors.
pub async fn extract_from_store(
    store: &dyn BlobStore,
    reference: &str,
    file_type: FileType,
) -> ServiceResult<String> {
    let data = store.read(reference).await.map_err(|e| match e {
        ServiceError::Storage(StorageError::NotFound { reference }) => {
            ServiceError::Extraction(ExtractionError::Unreadable {
                message: format!("source file {reference} is missing"),
            })
        }
        ServiceError::Storage(StorageError::InvalidReference { reference }) => {
            ServiceError::Extraction(ExtractionError::Unreadable {
                message: format!("source reference {reference} is invalid"),
            })
        }
        other => other,
    })?;

    let text = tokio::task::spawn_blocking(move || extract(&data, file_type))
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Extraction task failed: {}", e),
        })??;

    Ok(text)
}
