//! crates/scripture_reader_core/src/memory.rs
//!
//! An in-process implementation of the store ports. Backs the tests and the
//! `memory` store backend of the API service.

use crate::domain::{Book, BookId, Chapter, ChapterId, Highlight, HighlightColor, User, Verse, VerseId};
use crate::ports::{AuthSessionStore, PortError, PortResult, ScriptureStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    books: Vec<Book>,
    chapters: Vec<Chapter>,
    verses: Vec<Verse>,
    highlights: Vec<Highlight>,
    sessions: HashMap<String, User>,
    next_highlight_id: i64,
    next_verse_id: VerseId,
    failing: HashSet<&'static str>,
}

/// Store rows kept in memory behind a mutex.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis (50 chapters) and John (21 chapters), with ACF and KJV text
    /// for Genesis 1 and ACF text for John 1.
    pub fn with_sample() -> Self {
        let store = Self::new();
        store.add_book(1, "Genesis", Some("Gênesis"), 50);
        store.add_book(43, "John", Some("João"), 21);

        let genesis_acf: Vec<String> = (1..=31)
            .map(|n| match n {
                1 => "No princípio criou Deus os céus e a terra.".to_string(),
                n => format!("Gênesis 1:{} (ACF)", n),
            })
            .collect();
        store.add_verses(1, 1, "ACF", &genesis_acf);

        let genesis_kjv: Vec<String> = (1..=31)
            .map(|n| match n {
                1 => "In the beginning God created the heaven and the earth.".to_string(),
                n => format!("Genesis 1:{} (KJV)", n),
            })
            .collect();
        store.add_verses(1, 1, "KJV", &genesis_kjv);

        let john_acf: Vec<String> = (1..=51).map(|n| format!("João 1:{} (ACF)", n)).collect();
        store.add_verses(43, 1, "ACF", &john_acf);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only means a test panicked mid-write; the rows are still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a book with chapters `1..=chapter_count`.
    pub fn add_book(&self, id: BookId, name: &str, alternate_name: Option<&str>, chapter_count: u32) {
        let mut t = self.lock();
        t.books.push(Book {
            id,
            name: name.to_string(),
            alternate_name: alternate_name.map(str::to_string),
        });
        for chapter_number in 1..=chapter_count {
            t.chapters.push(Chapter {
                id: chapter_key(id, chapter_number),
                book_id: id,
                chapter_number,
            });
        }
    }

    /// Adds verses `1..=texts.len()` for one translation of a chapter.
    /// Returns the new verse ids in order.
    pub fn add_verses(&self, book_id: BookId, chapter_number: u32, version: &str, texts: &[String]) -> Vec<VerseId> {
        let mut t = self.lock();
        let chapter_id = chapter_key(book_id, chapter_number);
        let mut ids = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            t.next_verse_id += 1;
            let id = t.next_verse_id;
            t.verses.push(Verse {
                id,
                chapter_id,
                version: version.to_string(),
                verse_number: i as u32 + 1,
                text: text.clone(),
            });
            ids.push(id);
        }
        ids
    }

    pub fn add_auth_session(&self, session_id: &str, user: User) {
        self.lock().sessions.insert(session_id.to_string(), user);
    }

    /// Makes every call of the named store operation fail until cleared.
    pub fn fail_operation(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw highlight rows for a pair, bypassing the port.
    pub fn highlight_rows(&self, verse_id: VerseId, user_id: Uuid) -> Vec<Highlight> {
        self.lock()
            .highlights
            .iter()
            .filter(|h| h.verse_id == verse_id && h.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Inserts a highlight row directly, e.g. to reproduce duplicate rows.
    pub fn seed_highlight(&self, verse_id: VerseId, user_id: Uuid, color: HighlightColor) {
        let mut t = self.lock();
        push_highlight(&mut t, verse_id, user_id, color);
    }

    fn read(&self, operation: &'static str) -> PortResult<std::sync::MutexGuard<'_, Tables>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let t = self.lock();
        if t.failing.contains(operation) {
            return Err(PortError::Unexpected(format!("{} is unavailable", operation)));
        }
        Ok(t)
    }

    fn write(&self, operation: &'static str) -> PortResult<std::sync::MutexGuard<'_, Tables>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let t = self.lock();
        if t.failing.contains(operation) {
            return Err(PortError::Unexpected(format!("{} is unavailable", operation)));
        }
        Ok(t)
    }
}

fn chapter_key(book_id: BookId, chapter_number: u32) -> ChapterId {
    book_id * 1000 + chapter_number as ChapterId
}

fn push_highlight(t: &mut Tables, verse_id: VerseId, user_id: Uuid, color: HighlightColor) -> Highlight {
    t.next_highlight_id += 1;
    let highlight = Highlight {
        id: t.next_highlight_id,
        verse_id,
        user_id,
        color,
        created_at: Utc::now(),
    };
    t.highlights.push(highlight.clone());
    highlight
}

#[async_trait]
impl ScriptureStore for InMemoryStore {
    async fn list_books(&self) -> PortResult<Vec<Book>> {
        Ok(self.read("list_books")?.books.clone())
    }

    async fn get_book(&self, book_id: BookId) -> PortResult<Option<Book>> {
        let t = self.read("get_book")?;
        Ok(t.books.iter().find(|b| b.id == book_id).cloned())
    }

    async fn get_chapter(&self, book_id: BookId, chapter_number: u32) -> PortResult<Option<Chapter>> {
        let t = self.read("get_chapter")?;
        Ok(t.chapters
            .iter()
            .find(|c| c.book_id == book_id && c.chapter_number == chapter_number)
            .cloned())
    }

    async fn get_max_chapter_number(&self, book_id: BookId) -> PortResult<Option<u32>> {
        let t = self.read("get_max_chapter_number")?;
        Ok(t.chapters
            .iter()
            .filter(|c| c.book_id == book_id)
            .map(|c| c.chapter_number)
            .max())
    }

    async fn count_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<u64> {
        let t = self.read("count_verses")?;
        Ok(t.verses
            .iter()
            .filter(|v| v.chapter_id == chapter_id && v.version == version)
            .count() as u64)
    }

    async fn get_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<Vec<Verse>> {
        let t = self.read("get_verses")?;
        let mut verses: Vec<Verse> = t
            .verses
            .iter()
            .filter(|v| v.chapter_id == chapter_id && v.version == version)
            .cloned()
            .collect();
        verses.sort_by_key(|v| v.verse_number);
        Ok(verses)
    }

    async fn get_highlight(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<Option<Highlight>> {
        let t = self.read("get_highlight")?;
        Ok(t.highlights
            .iter()
            .find(|h| h.verse_id == verse_id && h.user_id == user_id)
            .cloned())
    }

    async fn get_highlights(&self, verse_ids: &[VerseId], user_id: Uuid) -> PortResult<Vec<Highlight>> {
        let t = self.read("get_highlights")?;
        Ok(t.highlights
            .iter()
            .filter(|h| h.user_id == user_id && verse_ids.contains(&h.verse_id))
            .cloned()
            .collect())
    }

    async fn insert_highlight(
        &self,
        verse_id: VerseId,
        user_id: Uuid,
        color: HighlightColor,
    ) -> PortResult<Highlight> {
        let mut t = self.write("insert_highlight")?;
        Ok(push_highlight(&mut t, verse_id, user_id, color))
    }

    async fn delete_highlights(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<u64> {
        let mut t = self.write("delete_highlights")?;
        let before = t.highlights.len();
        t.highlights.retain(|h| !(h.verse_id == verse_id && h.user_id == user_id));
        Ok((before - t.highlights.len()) as u64)
    }
}

#[async_trait]
impl AuthSessionStore for InMemoryStore {
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let t = self.read("validate_auth_session")?;
        t.sessions
            .get(session_id)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut t = self.write("delete_auth_session")?;
        t.sessions.remove(session_id);
        Ok(())
    }
}
