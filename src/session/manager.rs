/*!
 * Session manager for translation session lifecycle.
 *
 * This module handles:
 * - Finding an interrupted session for the same file and language
 * - Creating new translation sessions
 * - Recording translated lines and the resume index as a run progresses
 * - Pausing and completing sessions
 */

use anyhow::{Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

use crate::database::models::{SessionRecord, SessionStatus};
use crate::database::repository::Repository;

use super::models::{ResumePoint, SessionCreateParams, SessionInfo};

/// Session manager for handling translation session lifecycle
#[derive(Clone)]
pub struct SessionManager {
    /// Repository for database operations
    repo: Repository,
}

impl SessionManager {
    /// Create a new session manager with the given repository
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create a new session manager with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let repo = Repository::new_in_memory()?;
        Ok(Self::new(repo))
    }

    /// Get the underlying repository
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // =========================================================================
    // Session Creation
    // =========================================================================

    /// Create a new translation session
    pub async fn create_session(&self, params: &SessionCreateParams) -> Result<SessionInfo> {
        let session_id = Uuid::new_v4().to_string();
        let file_hash = self.hash_file(&params.source_file_path).await?;

        info!(
            "Creating new session {} for {} ({} lines)",
            &session_id[..8],
            params.source_file_path.display(),
            params.total_lines
        );

        let session_record = SessionRecord::new(
            session_id,
            params.source_file_path.to_string_lossy().to_string(),
            file_hash,
            params.target_language.clone(),
            params.provider.clone(),
            params.model.clone(),
            params.total_lines as i64,
        );

        self.repo.create_session(&session_record).await?;

        Ok(SessionInfo::from_record(&session_record))
    }

    /// Pick up an interrupted session for the same file content and language,
    /// or create a new one
    ///
    /// With `fresh`, any interrupted session is discarded first.
    pub async fn resume_or_create(&self, params: &SessionCreateParams, fresh: bool) -> Result<ResumePoint> {
        let file_hash = self.hash_file(&params.source_file_path).await?;
        let existing = self
            .repo
            .find_resumable_session(&file_hash, &params.target_language)
            .await?;

        match existing {
            Some(record) if fresh => {
                info!("Discarding interrupted session {}", &record.id[..8.min(record.id.len())]);
                self.repo.delete_session(&record.id).await?;
            }
            Some(record) if record.total_lines as usize != params.total_lines => {
                warn!(
                    "Session {} has {} lines but the file now has {}, starting over",
                    &record.id[..8.min(record.id.len())],
                    record.total_lines,
                    params.total_lines
                );
                self.repo.delete_session(&record.id).await?;
            }
            Some(record) => {
                let mut session = SessionInfo::from_record(&record);
                let mut translated_lines = self
                    .repo
                    .get_session_lines(&session.id)
                    .await?
                    .into_iter()
                    .filter(|(index, _)| *index >= 0)
                    .map(|(index, text)| (index as usize, text))
                    .collect::<Vec<_>>();

                // Every line before the resume index must be restorable
                let stored: HashSet<usize> = translated_lines.iter().map(|(index, _)| *index).collect();
                if let Some(gap) = (0..session.resume_index).find(|index| !stored.contains(index)) {
                    warn!(
                        "Session {} has no stored translation for line {}, resuming there instead of line {}",
                        session.short_id(),
                        gap,
                        session.resume_index
                    );
                    session.resume_index = gap;
                    translated_lines.retain(|(index, _)| *index < gap);
                    self.repo.update_resume_index(&session.id, gap as i64).await?;
                }

                if let Some(error) = &session.last_error {
                    info!("Previous run of session {} stopped with: {}", session.short_id(), error);
                }
                info!(
                    "Resuming session {} at line {} of {}",
                    session.short_id(),
                    session.resume_index,
                    session.total_lines
                );

                self.repo
                    .update_session_status(&session.id, SessionStatus::InProgress, None)
                    .await?;

                return Ok(ResumePoint {
                    session,
                    resumed: true,
                    translated_lines,
                });
            }
            None => {}
        }

        let session = self.create_session(params).await?;
        Ok(ResumePoint {
            session,
            resumed: false,
            translated_lines: Vec::new(),
        })
    }

    // =========================================================================
    // Session State Management
    // =========================================================================

    /// Get session by ID
    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionInfo>> {
        let record = self.repo.get_session(session_id).await?;
        Ok(record.map(|r| SessionInfo::from_record(&r)))
    }

    /// Store the final text of one line
    pub async fn record_line(&self, session_id: &str, index: usize, text: &str) -> Result<()> {
        self.repo.save_session_line(session_id, index as i64, text).await
    }

    /// Store the index the next run should start from
    pub async fn record_progress(&self, session_id: &str, resume_index: usize) -> Result<()> {
        debug!("Session {} resume index -> {}", &session_id[..8.min(session_id.len())], resume_index);
        self.repo.update_resume_index(session_id, resume_index as i64).await
    }

    /// Mark session as paused so the next run resumes it
    pub async fn pause_session(&self, session_id: &str, resume_index: usize, last_error: Option<String>) -> Result<()> {
        info!("Pausing session {} at line {}", &session_id[..8.min(session_id.len())], resume_index);
        self.repo.update_resume_index(session_id, resume_index as i64).await?;
        self.repo
            .update_session_status(session_id, SessionStatus::Paused, last_error)
            .await
    }

    /// Mark session as completed
    pub async fn complete_session(&self, session_id: &str, total_lines: usize) -> Result<()> {
        info!("Completing session {}", &session_id[..8.min(session_id.len())]);
        self.repo.update_resume_index(session_id, total_lines as i64).await?;
        self.repo
            .update_session_status(session_id, SessionStatus::Completed, None)
            .await
    }

    // =========================================================================
    // Utility Methods
    // =========================================================================

    /// Compute SHA256 hash of a file
    async fn hash_file(&self, path: &Path) -> Result<String> {
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;

            let mut hasher = Sha256::new();
            let mut buffer = [0u8; 8192];

            loop {
                let bytes_read = file.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .context("File hashing task panicked")?
    }
}
