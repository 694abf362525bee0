/*!
 * Session-specific models.
 *
 * These structures provide a higher-level abstraction over the raw
 * database records for session management operations.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::database::models::{SessionRecord, SessionStatus};

/// Parameters for creating a new session
#[derive(Debug, Clone)]
pub struct SessionCreateParams {
    /// Path to the source file
    pub source_file_path: PathBuf,
    /// Target language, verbatim
    pub target_language: String,
    /// Translation provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Number of caption lines in the file
    pub total_lines: usize,
}

impl SessionCreateParams {
    /// Create new session parameters
    pub fn new(
        source_file_path: PathBuf,
        target_language: String,
        provider: String,
        model: String,
        total_lines: usize,
    ) -> Self {
        Self {
            source_file_path,
            target_language,
            provider,
            model,
            total_lines,
        }
    }
}

/// High-level session information for display and tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: String,
    /// Source file path
    pub source_file_path: String,
    /// Target language
    pub target_language: String,
    /// Provider used
    pub provider: String,
    /// Model used
    pub model: String,
    /// Number of caption lines
    pub total_lines: usize,
    /// Next line to translate
    pub resume_index: usize,
    /// Session status
    pub status: SessionStatus,
    /// Diagnostic of the run that paused the session
    pub last_error: Option<String>,
}

impl SessionInfo {
    /// Create from a session record
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            source_file_path: record.source_file_path.clone(),
            target_language: record.target_language.clone(),
            provider: record.provider.clone(),
            model: record.model.clone(),
            total_lines: record.total_lines.max(0) as usize,
            resume_index: record.resume_index.max(0) as usize,
            status: record.status,
            last_error: record.last_error.clone(),
        }
    }

    /// Calculate completion percentage
    pub fn completion_percentage(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.resume_index as f64 / self.total_lines as f64) * 100.0
    }

    /// Short form of the ID for log lines
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    /// Get a human-readable status string
    pub fn status_display(&self) -> &'static str {
        match self.status {
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Paused => "Paused",
            SessionStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({:.1}% complete, {})",
            self.short_id(),
            self.target_language,
            self.completion_percentage(),
            self.status_display()
        )
    }
}

/// Where a translation run starts
#[derive(Debug, Clone)]
pub struct ResumePoint {
    /// The session the run belongs to
    pub session: SessionInfo,
    /// Whether an interrupted session was picked up
    pub resumed: bool,
    /// Lines translated by earlier runs, as (index, text)
    pub translated_lines: Vec<(usize, String)>,
}

impl ResumePoint {
    /// Line index the engine should start from
    pub fn start_index(&self) -> usize {
        self.session.resume_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        let mut record = SessionRecord::new(
            "0123456789abcdef".to_string(),
            "/movies/a.srt".to_string(),
            "hash".to_string(),
            "French".to_string(),
            "ollama".to_string(),
            "llama3".to_string(),
            200,
        );
        record.resume_index = 50;
        record
    }

    #[test]
    fn test_sessionInfo_fromRecord_shouldCarryResumeIndex() {
        let info = SessionInfo::from_record(&record());
        assert_eq!(info.resume_index, 50);
        assert_eq!(info.total_lines, 200);
        assert_eq!(info.completion_percentage(), 25.0);
    }

    #[test]
    fn test_sessionInfo_display_shouldUseShortId() {
        let text = SessionInfo::from_record(&record()).to_string();
        assert!(text.starts_with("[01234567] French"));
        assert!(text.contains("25.0%"));
    }
}
