/*!
 * Error types for the subtide application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether the provider could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }

    /// Classify a transport-level reqwest error
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors that end or prevent a translation run
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Invalid settings, rejected before a run starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider became unreachable mid-run
    #[error("connectivity lost")]
    Connectivity(#[source] ProviderError),

    /// The provider answered with an error
    #[error("Provider error: {0}")]
    Provider(#[source] ProviderError),

    /// A batch response was malformed or incomplete
    #[error("Invalid batch response: no translation for \"{source_text}\"")]
    Validation {
        /// Source text of the first line without a parsed translation
        source_text: String,
    },

    /// Persistent cache write failed (non-fatal)
    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    /// A run is already active on this engine
    #[error("Translation engine already started")]
    AlreadyRunning,
}

// Connectivity loss is resumable and reported differently from other provider failures
impl From<ProviderError> for TranslationError {
    fn from(error: ProviderError) -> Self {
        if error.is_connectivity() {
            Self::Connectivity(error)
        } else {
            Self::Provider(error)
        }
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// A block could not be parsed
    #[error("Malformed subtitle block {block}: {message}")]
    Malformed {
        /// 1-based block position in the file
        block: usize,
        /// What was wrong with it
        message: String,
    },

    /// The file contained no caption blocks
    #[error("No subtitle entries found")]
    Empty,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
