//! crates/scripture_reader_core/src/ports.rs
//!
//! Defines the service contracts (traits) the reader core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted relational store and the auth provider.

use crate::domain::{Book, BookId, Chapter, ChapterId, Highlight, HighlightColor, User, Verse, VerseId};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The row-based query surface of the scripture store.
///
/// Book, chapter and verse rows are read-only from the reader's side; only
/// highlight rows are written.
#[async_trait]
pub trait ScriptureStore: Send + Sync {
    // --- Reference data ---
    async fn list_books(&self) -> PortResult<Vec<Book>>;

    async fn get_book(&self, book_id: BookId) -> PortResult<Option<Book>>;

    async fn get_chapter(&self, book_id: BookId, chapter_number: u32) -> PortResult<Option<Chapter>>;

    async fn get_max_chapter_number(&self, book_id: BookId) -> PortResult<Option<u32>>;

    // --- Verses ---
    async fn count_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<u64>;

    /// Verses of one translation, ordered by `verse_number`. May be empty.
    async fn get_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<Vec<Verse>>;

    // --- Highlights ---
    async fn get_highlight(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<Option<Highlight>>;

    async fn get_highlights(&self, verse_ids: &[VerseId], user_id: Uuid) -> PortResult<Vec<Highlight>>;

    async fn insert_highlight(
        &self,
        verse_id: VerseId,
        user_id: Uuid,
        color: HighlightColor,
    ) -> PortResult<Highlight>;

    /// Deletes every highlight row for the pair and returns how many went away.
    async fn delete_highlights(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<u64>;
}

/// Persisted browser sessions issued by the external auth provider.
#[async_trait]
pub trait AuthSessionStore: Send + Sync {
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

/// A sign-in or sign-out transition reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
}

pub type AuthEventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

/// The authentication collaborator. The reader only reads the current user
/// and follows transitions to gate highlight actions.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> PortResult<Option<User>>;

    fn auth_events(&self) -> AuthEventStream;
}
