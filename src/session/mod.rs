/*!
 * Session management module for translation sessions.
 *
 * This module provides:
 * - Session creation and tracking
 * - Resume capability for interrupted translations
 * - Persistence of translated lines and the resume index
 */

pub mod manager;
pub mod models;

// Re-export main types
pub use manager::SessionManager;
pub use models::{ResumePoint, SessionCreateParams, SessionInfo};
