//! crates/scripture_reader_core/src/navigation.rs
//!
//! The shared book/chapter position of a reader session.

use crate::domain::BookId;
use crate::ports::{PortResult, ScriptureStore};
use serde::Serialize;
use tracing::{debug, warn};

/// Upper bound used until, or instead of, a successful chapter-count lookup.
pub const DEFAULT_MAX_CHAPTERS: u32 = 50;

/// A pending chapter-count recomputation for one book selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsRequest {
    pub book_id: BookId,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationSnapshot {
    pub book_id: BookId,
    pub chapter_number: u32,
    pub max_chapters: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone)]
pub struct NavigationState {
    selected_book_id: BookId,
    chapter_number: u32,
    max_chapters: u32,
    generation: u64,
}

impl NavigationState {
    pub fn new(book_id: BookId) -> Self {
        Self {
            selected_book_id: book_id,
            chapter_number: 1,
            max_chapters: DEFAULT_MAX_CHAPTERS,
            generation: 0,
        }
    }

    pub fn selected_book_id(&self) -> BookId {
        self.selected_book_id
    }

    pub fn chapter_number(&self) -> u32 {
        self.chapter_number
    }

    pub fn max_chapters(&self) -> u32 {
        self.max_chapters
    }

    pub fn has_next(&self) -> bool {
        self.chapter_number < self.max_chapters
    }

    pub fn has_previous(&self) -> bool {
        self.chapter_number > 1
    }

    /// Switches book, resets to chapter 1, and returns the bounds lookup to run.
    pub fn select_book(&mut self, book_id: BookId) -> BoundsRequest {
        self.selected_book_id = book_id;
        self.chapter_number = 1;
        self.bounds_request()
    }

    /// A lookup for the current book, superseding any earlier one.
    pub fn bounds_request(&mut self) -> BoundsRequest {
        self.generation += 1;
        BoundsRequest {
            book_id: self.selected_book_id,
            generation: self.generation,
        }
    }

    /// Applies the outcome of a bounds lookup.
    ///
    /// Superseded requests are ignored. Errors and missing rows fall back to
    /// [`DEFAULT_MAX_CHAPTERS`]. If the current chapter falls outside the new
    /// bounds the position resets to chapter 1. Returns whether it applied.
    pub fn settle_bounds(&mut self, request: BoundsRequest, lookup: PortResult<Option<u32>>) -> bool {
        if request.generation != self.generation || request.book_id != self.selected_book_id {
            debug!(book_id = request.book_id, "Discarding superseded chapter-count lookup");
            return false;
        }

        self.max_chapters = match lookup {
            Ok(Some(max)) if max >= 1 => max,
            Ok(_) => {
                warn!(book_id = request.book_id, "Book has no chapters, using default bound");
                DEFAULT_MAX_CHAPTERS
            }
            Err(e) => {
                warn!(book_id = request.book_id, error = %e, "Chapter-count lookup failed, using default bound");
                DEFAULT_MAX_CHAPTERS
            }
        };
        if self.chapter_number > self.max_chapters {
            self.chapter_number = 1;
        }
        true
    }

    /// Runs the bounds lookup for `request` against the store and settles it.
    pub async fn refresh_bounds(&mut self, request: BoundsRequest, store: &dyn ScriptureStore) -> bool {
        let lookup = store.get_max_chapter_number(request.book_id).await;
        self.settle_bounds(request, lookup)
    }

    /// Returns true if the chapter moved.
    pub fn next_chapter(&mut self) -> bool {
        if self.has_next() {
            self.chapter_number += 1;
            true
        } else {
            false
        }
    }

    /// Returns true if the chapter moved.
    pub fn previous_chapter(&mut self) -> bool {
        if self.has_previous() {
            self.chapter_number -= 1;
            true
        } else {
            false
        }
    }

    /// Jumps to `chapter_number` if it is within bounds.
    pub fn select_chapter(&mut self, chapter_number: u32) -> bool {
        if (1..=self.max_chapters).contains(&chapter_number) && chapter_number != self.chapter_number {
            self.chapter_number = chapter_number;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        NavigationSnapshot {
            book_id: self.selected_book_id,
            chapter_number: self.chapter_number,
            max_chapters: self.max_chapters,
            has_next: self.has_next(),
            has_previous: self.has_previous(),
        }
    }
}
