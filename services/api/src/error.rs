//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::http::StatusCode;
use scripture_reader_core::ReaderError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while running the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a reader error onto the HTTP status and the message shown to the user.
pub fn reader_error_response(error: &ReaderError) -> (StatusCode, String) {
    let status = match error {
        ReaderError::BookNotFound(_)
        | ReaderError::ChapterNotFound { .. }
        | ReaderError::VersionNotAvailableForChapter { .. } => StatusCode::NOT_FOUND,
        ReaderError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ReaderError::Panel(_) => StatusCode::BAD_REQUEST,
        ReaderError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.user_message())
}
