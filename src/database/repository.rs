/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::connection::DatabaseConnection;
use super::models::{CacheRecord, SessionRecord, SessionStatus};

const SESSION_COLUMNS: &str = "id, source_file_path, source_file_hash, target_language, provider, model, \
     total_lines, resume_index, status, last_error, created_at, updated_at, completed_at";

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    fn session_from_row(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            id: row.get(0)?,
            source_file_path: row.get(1)?,
            source_file_hash: row.get(2)?,
            target_language: row.get(3)?,
            provider: row.get(4)?,
            model: row.get(5)?,
            total_lines: row.get(6)?,
            resume_index: row.get(7)?,
            status: row
                .get::<_, String>(8)?
                .parse()
                .unwrap_or(SessionStatus::InProgress),
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    /// Create a new translation session
    pub async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let session = session.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        SESSION_COLUMNS
                    ),
                    params![
                        session.id,
                        session.source_file_path,
                        session.source_file_hash,
                        session.target_language,
                        session.provider,
                        session.model,
                        session.total_lines,
                        session.resume_index,
                        session.status.to_string(),
                        session.last_error,
                        session.created_at,
                        session.updated_at,
                        session.completed_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a session by ID
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_session_sync(conn, &session_id))
            .await
    }

    fn get_session_sync(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
        let result = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
                [session_id],
                Self::session_from_row,
            )
            .optional()?;

        Ok(result)
    }

    /// Find the most recent resumable session for a file and target language
    pub async fn find_resumable_session(
        &self,
        source_file_hash: &str,
        target_language: &str,
    ) -> Result<Option<SessionRecord>> {
        let source_file_hash = source_file_hash.to_string();
        let target_language = target_language.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        &format!(
                            r#"
                            SELECT {} FROM sessions
                            WHERE source_file_hash = ?1
                              AND target_language = ?2
                              AND status IN ('in_progress', 'paused')
                            ORDER BY updated_at DESC
                            LIMIT 1
                            "#,
                            SESSION_COLUMNS
                        ),
                        params![source_file_hash, target_language],
                        Self::session_from_row,
                    )
                    .optional()?;

                Ok(result)
            })
            .await
    }

    /// Update session status, recording the diagnostic of a failed run
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        last_error: Option<String>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                let completed_at = if status == SessionStatus::Completed {
                    Some(now.clone())
                } else {
                    None
                };

                conn.execute(
                    r#"
                    UPDATE sessions
                    SET status = ?1, last_error = ?2, updated_at = ?3,
                        completed_at = COALESCE(?4, completed_at)
                    WHERE id = ?5
                    "#,
                    params![status.to_string(), last_error, now, completed_at, session_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Persist the next line index to translate
    pub async fn update_resume_index(&self, session_id: &str, resume_index: i64) -> Result<()> {
        let session_id = session_id.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE sessions SET resume_index = ?1, updated_at = ?2 WHERE id = ?3",
                    params![resume_index, now, session_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Delete a session and its translated lines
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();

        self.db
            .execute_async(move |conn| {
                // Due to CASCADE, deleting the session will delete related lines
                conn.execute("DELETE FROM sessions WHERE id = ?1", [&session_id])?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Session Line Operations
    // =========================================================================

    /// Store the translated text of one line
    pub async fn save_session_line(&self, session_id: &str, line_index: i64, translated_text: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let translated_text = translated_text.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO session_lines (session_id, line_index, translated_text)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(session_id, line_index) DO UPDATE SET translated_text = excluded.translated_text
                    "#,
                    params![session_id, line_index, translated_text],
                )?;
                Ok(())
            })
            .await
    }

    /// Translated lines of a session, ordered by index
    pub async fn get_session_lines(&self, session_id: &str) -> Result<Vec<(i64, String)>> {
        let session_id = session_id.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT line_index, translated_text FROM session_lines WHERE session_id = ?1 ORDER BY line_index",
                )?;
                let lines = stmt
                    .query_map([&session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
                Ok(lines)
            })
            .await
    }

    // =========================================================================
    // Cache Operations
    // =========================================================================

    /// Compute SHA256 hash of text
    pub fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get a cached translation
    pub async fn get_cached_translation(&self, source_text: &str, target_language: &str) -> Result<Option<String>> {
        let source_text_hash = Self::hash_text(source_text);
        let target_language = target_language.to_string();

        self.db
            .execute_async(move |conn| {
                let result: Option<(i64, String)> = conn
                    .query_row(
                        r#"
                        SELECT id, translated_text
                        FROM translation_cache
                        WHERE source_text_hash = ?1
                          AND target_language = ?2
                        "#,
                        params![source_text_hash, target_language],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                if let Some((id, translated_text)) = result {
                    conn.execute(
                        "UPDATE translation_cache SET hit_count = hit_count + 1 WHERE id = ?1",
                        [id],
                    )?;
                    debug!("Database cache hit for translation");
                    Ok(Some(translated_text))
                } else {
                    Ok(None)
                }
            })
            .await
    }

    /// Store a translation in the cache; an existing entry for the key is kept
    pub async fn cache_translation(&self, record: &CacheRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_cache (
                        source_text_hash, source_text, target_language,
                        translated_text, created_at, hit_count
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(source_text_hash, target_language) DO NOTHING
                    "#,
                    params![
                        record.source_text_hash,
                        record.source_text,
                        record.target_language,
                        record.translated_text,
                        record.created_at,
                        record.hit_count,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get cache statistics
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        self.db
            .execute_async(|conn| {
                let total_entries: i64 = conn
                    .query_row("SELECT COUNT(*) FROM translation_cache", [], |row| row.get(0))
                    .unwrap_or(0);

                let total_hits: i64 = conn
                    .query_row(
                        "SELECT COALESCE(SUM(hit_count), 0) FROM translation_cache",
                        [],
                        |row| row.get(0),
                    )
                    .unwrap_or(0);

                Ok(CacheStats {
                    total_entries,
                    total_hits,
                })
            })
            .await
    }

    /// Clear the translation cache
    pub async fn clear_cache(&self) -> Result<i64> {
        self.db
            .execute_async(|conn| {
                let deleted = conn.execute("DELETE FROM translation_cache", [])?;
                Ok(deleted as i64)
            })
            .await
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of cache entries
    pub total_entries: i64,
    /// Total number of cache hits
    pub total_hits: i64,
}
