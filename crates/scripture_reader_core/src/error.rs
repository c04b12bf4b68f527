//! crates/scripture_reader_core/src/error.rs
//!
//! The reader's error taxonomy. UI messages key off the variant, so the
//! not-found kinds must stay distinct.

use crate::domain::BookId;
use crate::panels::PanelRejection;
use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaderError {
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("Chapter {chapter_number} of {book_name} not found")]
    ChapterNotFound { book_name: String, chapter_number: u32 },

    /// The chapter exists, but this translation has no verses for it.
    #[error("Version {version} is not available for chapter {chapter_number}")]
    VersionNotAvailableForChapter { version: String, chapter_number: u32 },

    #[error("Store error during {operation} ({context}): {source}")]
    Store {
        operation: &'static str,
        context: String,
        #[source]
        source: PortError,
    },

    #[error("Sign-in required")]
    Unauthenticated,

    #[error(transparent)]
    Panel(#[from] PanelRejection),
}

pub type ReaderResult<T> = Result<T, ReaderError>;

impl ReaderError {
    pub(crate) fn store(operation: &'static str, context: impl Into<String>, source: PortError) -> Self {
        let context = context.into();
        tracing::error!(operation, %context, error = %source, "Scripture store call failed");
        ReaderError::Store { operation, context, source }
    }

    /// Whether the error belongs inline in the panel that issued the fetch
    /// rather than in a transient notification.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            ReaderError::BookNotFound(_)
                | ReaderError::ChapterNotFound { .. }
                | ReaderError::VersionNotAvailableForChapter { .. }
        )
    }

    /// Wording shown to the reader.
    pub fn user_message(&self) -> String {
        match self {
            ReaderError::BookNotFound(_) => "This book could not be found.".to_string(),
            ReaderError::ChapterNotFound { book_name, chapter_number } => {
                format!("{} has no chapter {}.", book_name, chapter_number)
            }
            ReaderError::VersionNotAvailableForChapter { version, .. } => {
                format!("The {} version isn't available yet for this passage.", version)
            }
            ReaderError::Store { .. } => "Something went wrong talking to the server. Please try again.".to_string(),
            ReaderError::Unauthenticated => "Sign in to highlight verses.".to_string(),
            ReaderError::Panel(rejection) => rejection.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kinds_are_inline_and_store_errors_are_not() {
        assert!(ReaderError::BookNotFound(9).is_inline());
        assert!(ReaderError::VersionNotAvailableForChapter { version: "XYZ".into(), chapter_number: 1 }.is_inline());
        let store = ReaderError::Store {
            operation: "get_verses",
            context: "chapter=1".into(),
            source: PortError::Unexpected("timeout".into()),
        };
        assert!(!store.is_inline());
        assert!(!ReaderError::Unauthenticated.is_inline());
        assert!(!ReaderError::from(PanelRejection::NoSuchPanel).is_inline());
    }

    #[test]
    fn version_message_differs_from_chapter_message() {
        let version = ReaderError::VersionNotAvailableForChapter { version: "XYZ".into(), chapter_number: 3 };
        let chapter = ReaderError::ChapterNotFound { book_name: "Genesis".into(), chapter_number: 3 };
        assert!(version.user_message().contains("isn't available yet"));
        assert_ne!(version.user_message(), chapter.user_message());
    }
}
