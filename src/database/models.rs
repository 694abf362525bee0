/*!
 * Database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is actively being processed
    InProgress,
    /// Session was canceled or stopped by an error and can be resumed
    Paused,
    /// Every line translated and the output written
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(SessionStatus::InProgress),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// Translation session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier (UUID)
    pub id: String,
    /// Path to the source subtitle file
    pub source_file_path: String,
    /// SHA256 hash of the source file content
    pub source_file_hash: String,
    /// Target language, verbatim
    pub target_language: String,
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Number of caption lines in the file
    pub total_lines: i64,
    /// Next line index to translate
    pub resume_index: i64,
    /// Current session status
    pub status: SessionStatus,
    /// Diagnostic of the run that paused the session, if it failed
    pub last_error: Option<String>,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    /// Last update timestamp (ISO 8601)
    pub updated_at: String,
    /// Completion timestamp (ISO 8601), if completed
    pub completed_at: Option<String>,
}

impl SessionRecord {
    /// Create a new session record
    pub fn new(
        id: String,
        source_file_path: String,
        source_file_hash: String,
        target_language: String,
        provider: String,
        model: String,
        total_lines: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            source_file_path,
            source_file_hash,
            target_language,
            provider,
            model,
            total_lines,
            resume_index: 0,
            status: SessionStatus::InProgress,
            last_error: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Check if session is resumable
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, SessionStatus::InProgress | SessionStatus::Paused)
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.resume_index as f64 / self.total_lines as f64) * 100.0
    }
}

/// Translation cache record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// SHA256 hash of source text
    pub source_text_hash: String,
    /// Original source text
    pub source_text: String,
    /// Target language, verbatim
    pub target_language: String,
    /// Translated text
    pub translated_text: String,
    /// Creation timestamp
    pub created_at: String,
    /// Number of cache hits
    pub hit_count: i64,
}

impl CacheRecord {
    /// Create a new cache record
    pub fn new(source_text_hash: String, source_text: String, target_language: String, translated_text: String) -> Self {
        Self {
            source_text_hash,
            source_text,
            target_language,
            translated_text,
            created_at: chrono::Utc::now().to_rfc3339(),
            hit_count: 0,
        }
    }
}
