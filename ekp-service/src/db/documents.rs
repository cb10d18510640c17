//! Document CRUD operations.
//!
//! This module contains all document-related database operations including
//! insert, get, list, delete, and guarded status transitions.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params, params_from_iter};

use super::Database;
use super::models::{DOCUMENT_COLUMNS, Document, DocumentStatus, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

/// Outcome of a conditional status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// The document was in the expected state and now carries the new one
    Applied,
    /// No document with that id
    NotFound,
    /// The document exists but was in a different state
    Conflict(DocumentStatus),
}

impl Database {
    /// Insert a new document
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO documents (id, title, file_path, file_size, file_type, status, error_message, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                doc.id,
                doc.title,
                doc.file_path,
                doc.file_size as i64,
                doc.file_type,
                doc.status.as_str(),
                doc.error_message,
                doc.created_by,
                format_timestamp(&doc.created_at),
                format_timestamp(&doc.updated_at),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Current status of a document, `None` if it does not exist
    pub fn get_document_status(&self, id: &str) -> ServiceResult<Option<DocumentStatus>> {
        let conn = self.lock()?;
        Self::query_status(&conn, id)
    }

    pub(super) fn query_status(
        conn: &rusqlite::Connection,
        id: &str,
    ) -> ServiceResult<Option<DocumentStatus>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Query)?;

        raw.map(|s| {
            DocumentStatus::parse(&s).ok_or_else(|| {
                DatabaseError::CorruptRow {
                    message: format!("document {id} has unknown status {s:?}"),
                }
                .into()
            })
        })
        .transpose()
    }

    /// List documents newest first, optionally filtered by status.
    /// Returns the page and the total number of matching documents.
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        offset: usize,
        limit: usize,
    ) -> ServiceResult<(Vec<Document>, usize)> {
        let conn = self.lock()?;
        let status_filter = status.map(|s| s.as_str());

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE (?1 IS NULL OR status = ?1)",
                params![status_filter],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE (?1 IS NULL OR status = ?1) \
                 ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3"
            ))
            .map_err(DatabaseError::Query)?;

        let docs = stmt
            .query_map(
                params![status_filter, limit as i64, offset as i64],
                Document::from_row,
            )
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok((docs, total.max(0) as usize))
    }

    /// Move a document from `from` to `to` in one statement.
    ///
    /// `error_message` is stored as given (callers pass `Some` only for ERROR).
    /// `updated_at` never drops below `created_at`.
    pub fn transition_document_status(
        &self,
        id: &str,
        from: DocumentStatus,
        to: DocumentStatus,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<StatusTransition> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE documents SET status = ?1, error_message = ?2, updated_at = MAX(?3, created_at) \
                 WHERE id = ?4 AND status = ?5",
                params![
                    to.as_str(),
                    error_message,
                    format_timestamp(&now),
                    id,
                    from.as_str()
                ],
            )
            .map_err(DatabaseError::Query)?;

        if rows > 0 {
            return Ok(StatusTransition::Applied);
        }

        Ok(match Self::query_status(&conn, id)? {
            None => StatusTransition::NotFound,
            Some(current) => StatusTransition::Conflict(current),
        })
    }

    /// Get the oldest document waiting for ingestion, passing over `skip`
    pub fn get_next_pending_document(&self, skip: &[String]) -> ServiceResult<Option<Document>> {
        let conn = self.lock()?;

        let excluded = if skip.is_empty() {
            String::new()
        } else {
            format!(" AND id NOT IN ({})", vec!["?"; skip.len()].join(", "))
        };

        conn.query_row(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE status = 'PENDING'{excluded} \
                 ORDER BY created_at ASC, id LIMIT 1"
            ),
            params_from_iter(skip),
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Return documents stranded in PROCESSING (by a crash) to PENDING
    pub fn reset_interrupted_documents(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE documents SET status = 'PENDING', error_message = NULL, updated_at = MAX(?1, created_at) \
                 WHERE status = 'PROCESSING'",
                params![format_timestamp(&now)],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows)
    }

    /// Delete a document and its extracted text and chunks, unless an
    /// ingestion run currently holds it.
    ///
    /// `Applied` means the row is gone; `Conflict(Processing)` means it was kept.
    pub fn delete_document(&self, id: &str) -> ServiceResult<StatusTransition> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "DELETE FROM documents WHERE id = ?1 AND status != 'PROCESSING'",
                params![id],
            )
            .map_err(DatabaseError::Query)?;

        if rows > 0 {
            return Ok(StatusTransition::Applied);
        }

        Ok(match Self::query_status(&conn, id)? {
            None => StatusTransition::NotFound,
            Some(current) => StatusTransition::Conflict(current),
        })
    }
}
