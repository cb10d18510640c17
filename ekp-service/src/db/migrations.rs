//! Database schema migrations.
//!
//! This module contains all database migrations and schema setup.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

const SCHEMA_VERSION: i64 = 2;

/// Run all database migrations.
///
/// This function is called during database initialization to ensure
/// the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(DatabaseError::Query)?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| DatabaseError::Migration {
            message: e.to_string(),
        })?;

    Ok(())
}

fn migrate_v1(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- Documents table
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL CHECK (file_size >= 0),
            file_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'PROCESSING', 'PROCESSED', 'ERROR')),
            error_message TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK ((status = 'ERROR') = (error_message IS NOT NULL AND length(error_message) > 0)),
            CHECK (updated_at >= created_at)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status, created_at);

        -- Full extracted text, one row per document
        CREATE TABLE IF NOT EXISTS document_texts (
            document_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            char_count INTEGER NOT NULL,
            extracted_at TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        -- Indexed passages
        CREATE TABLE IF NOT EXISTS document_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            token_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_document_chunks_document ON document_chunks(document_id);

        -- QA sessions. document_id is a weak reference: no foreign key.
        CREATE TABLE IF NOT EXISTS qa_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            document_id TEXT,
            question TEXT NOT NULL CHECK (length(question) > 0),
            answer TEXT,
            model_used TEXT,
            tokens_used INTEGER NOT NULL DEFAULT 0 CHECK (tokens_used >= 0),
            response_time_ms INTEGER NOT NULL DEFAULT 0 CHECK (response_time_ms >= 0),
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_qa_sessions_user ON qa_sessions(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_qa_sessions_document ON qa_sessions(document_id, created_at);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}

/// Chunk embeddings and QA answer sources
fn migrate_v2(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE document_chunks ADD COLUMN embedding BLOB;
        ALTER TABLE qa_sessions ADD COLUMN sources TEXT NOT NULL DEFAULT '[]';
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_upgrade_from_first_schema_keeps_sessions() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute(
            "INSERT INTO qa_sessions (id, user_id, question, created_at) \
             VALUES ('s1', '9', 'What?', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let sources: String = conn
            .query_row("SELECT sources FROM qa_sessions WHERE id = 's1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(sources, "[]");
    }

    #[test]
    fn test_error_status_requires_message() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = |status: &str, message: Option<&str>| {
            conn.execute(
                "INSERT INTO documents (id, title, file_path, file_size, file_type, status, error_message, created_at, updated_at) \
                 VALUES (?1, 't', 'f', 1, 'txt', ?2, ?3, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
                rusqlite::params![format!("{status}-{}", message.is_some()), status, message],
            )
        };

        assert!(insert("ERROR", None).is_err());
        assert!(insert("ERROR", Some("")).is_err());
        assert!(insert("ERROR", Some("corrupt")).is_ok());
        assert!(insert("PROCESSED", Some("stale")).is_err());
        assert!(insert("PROCESSED", None).is_ok());
    }
}
