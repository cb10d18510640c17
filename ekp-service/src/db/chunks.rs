//! Extracted text and chunk storage.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Database;
use super::models::{
    CHUNK_COLUMNS, DocumentChunk, DocumentStatus, ExtractedText, encode_embedding,
    format_timestamp,
};
use crate::error::{DatabaseError, ServiceResult};

/// A document's status with whatever it has indexed, read in one go
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub status: DocumentStatus,
    /// Empty unless the document is `PROCESSED`
    pub chunks: Vec<DocumentChunk>,
    /// Full text, loaded only for a `PROCESSED` document without chunks
    pub text: Option<String>,
}

impl Database {
    /// Replace a document's extracted text and chunks in one transaction.
    ///
    /// Readers see either the previous extraction or the new one, never a mix.
    pub fn replace_extraction(
        &self,
        document_id: &str,
        content: &str,
        chunks: &[DocumentChunk],
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        tx.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.execute(
            r#"
            INSERT INTO document_texts (document_id, content, char_count, extracted_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(document_id) DO UPDATE SET
                content = excluded.content,
                char_count = excluded.char_count,
                extracted_at = excluded.extracted_at
            "#,
            params![
                document_id,
                content,
                content.chars().count() as i64,
                format_timestamp(&now),
            ],
        )
        .map_err(DatabaseError::Query)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO document_chunks (id, document_id, chunk_index, content, token_count, embedding) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(DatabaseError::Query)?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    document_id,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.token_count,
                    chunk.embedding.as_deref().map(encode_embedding),
                ])
                .map_err(DatabaseError::Query)?;
            }
        }

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Drop a document's extracted text and chunks
    pub fn clear_extraction(&self, document_id: &str) -> ServiceResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        tx.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(DatabaseError::Query)?;
        tx.execute(
            "DELETE FROM document_texts WHERE document_id = ?1",
            params![document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Get the full extracted text of a document
    pub fn get_extracted_text(&self, document_id: &str) -> ServiceResult<Option<ExtractedText>> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT document_id, content, char_count, extracted_at FROM document_texts WHERE document_id = ?1",
            params![document_id],
            ExtractedText::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Get all chunks of a document in reading order
    pub fn get_document_chunks(&self, document_id: &str) -> ServiceResult<Vec<DocumentChunk>> {
        let conn = self.lock()?;
        Self::query_chunks(&conn, document_id)
    }

    /// Status and indexed content of a document under a single lock, so a
    /// concurrent delete or reset cannot land between the two reads.
    /// `None` if the document does not exist.
    pub fn get_document_content(&self, document_id: &str) -> ServiceResult<Option<DocumentContent>> {
        let conn = self.lock()?;

        let Some(status) = Self::query_status(&conn, document_id)? else {
            return Ok(None);
        };
        if status != DocumentStatus::Processed {
            return Ok(Some(DocumentContent {
                status,
                chunks: Vec::new(),
                text: None,
            }));
        }

        let chunks = Self::query_chunks(&conn, document_id)?;
        let text = if chunks.is_empty() {
            conn.query_row(
                "SELECT content FROM document_texts WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Query)?
        } else {
            None
        };

        Ok(Some(DocumentContent {
            status,
            chunks,
            text,
        }))
    }

    fn query_chunks(conn: &Connection, document_id: &str) -> ServiceResult<Vec<DocumentChunk>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index"
            ))
            .map_err(DatabaseError::Query)?;

        let chunks = stmt
            .query_map(params![document_id], DocumentChunk::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(chunks)
    }

    /// Count chunks for a document
    pub fn get_chunk_count(&self, document_id: &str) -> ServiceResult<usize> {
        let conn = self.lock()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        Ok(count.max(0) as usize)
    }
}
