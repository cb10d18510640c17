//! QA session records. Append-only: there is no update or delete.

use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{QA_SESSION_COLUMNS, QaSession, format_timestamp};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

impl Database {
    /// Insert a completed QA session
    pub fn insert_qa_session(&self, session: &QaSession) -> ServiceResult<()> {
        let sources = serde_json::to_string(&session.sources).map_err(|e| ServiceError::Internal {
            message: format!("failed to encode answer sources: {}", e),
        })?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO qa_sessions (id, user_id, document_id, question, answer, model_used, tokens_used, response_time_ms, created_at, sources)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                session.id,
                session.user_id,
                session.document_id,
                session.question,
                session.answer,
                session.model_used,
                session.tokens_used,
                session.response_time_ms as i64,
                format_timestamp(&session.created_at),
                sources,
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a QA session by ID
    pub fn get_qa_session(&self, id: &str) -> ServiceResult<Option<QaSession>> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {QA_SESSION_COLUMNS} FROM qa_sessions WHERE id = ?1"),
            params![id],
            QaSession::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List QA sessions newest first, optionally filtered by user and/or document
    pub fn list_qa_sessions(
        &self,
        user_id: Option<&str>,
        document_id: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> ServiceResult<Vec<QaSession>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {QA_SESSION_COLUMNS} FROM qa_sessions \
                 WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR document_id = ?2) \
                 ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4"
            ))
            .map_err(DatabaseError::Query)?;

        let sessions = stmt
            .query_map(
                params![user_id, document_id, limit as i64, offset as i64],
                QaSession::from_row,
            )
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn session(id: &str, user: &str, document_id: Option<&str>, age_secs: i64) -> QaSession {
        QaSession {
            id: id.to_string(),
            user_id: user.to_string(),
            document_id: document_id.map(str::to_string),
            question: "What is X?".to_string(),
            answer: Some("X is Y".to_string()),
            model_used: Some("llama3.2".to_string()),
            tokens_used: 42,
            response_time_ms: 120,
            sources: vec![0, 2],
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_insert_and_get_session() {
        let db = Database::open_in_memory().unwrap();
        db.insert_qa_session(&session("s1", "9", Some("doc"), 0))
            .unwrap();

        let stored = db.get_qa_session("s1").unwrap().unwrap();
        assert_eq!(stored.user_id, "9");
        assert_eq!(stored.document_id.as_deref(), Some("doc"));
        assert_eq!(stored.tokens_used, 42);
        assert_eq!(stored.response_time_ms, 120);
        assert_eq!(stored.sources, vec![0, 2]);

        assert!(db.get_qa_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_session_may_reference_unknown_document() {
        let db = Database::open_in_memory().unwrap();
        // No foreign key: sessions outlive their documents
        db.insert_qa_session(&session("s1", "9", Some("deleted-doc"), 0))
            .unwrap();
        assert!(db.get_qa_session("s1").unwrap().is_some());
    }

    #[test]
    fn test_list_sessions_filters_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_qa_session(&session("old", "9", Some("a"), 30))
            .unwrap();
        db.insert_qa_session(&session("new", "9", None, 10)).unwrap();
        db.insert_qa_session(&session("other", "5", Some("a"), 20))
            .unwrap();

        let mine = db.list_qa_sessions(Some("9"), None, 0, 10).unwrap();
        let ids: Vec<_> = mine.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let about_a = db.list_qa_sessions(None, Some("a"), 0, 10).unwrap();
        assert_eq!(about_a.len(), 2);

        let paged = db.list_qa_sessions(None, None, 1, 1).unwrap();
        assert_eq!(paged[0].id, "other");
    }
}
