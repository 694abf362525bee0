/*!
 * Database module for persistent storage of translations and sessions.
 *
 * This module provides SQLite-based persistence for:
 * - The persistent translation cache
 * - Translation sessions with their resume index and translated lines
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;
