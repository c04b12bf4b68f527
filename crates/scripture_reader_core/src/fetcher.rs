//! crates/scripture_reader_core/src/fetcher.rs
//!
//! Resolves a (book, chapter, version) triple to an ordered verse list, and a
//! user's highlight colors for a rendered chapter. Both reads are cached;
//! neither writes to the store.

use crate::cache::{CachePolicy, Lookup, QueryCache};
use crate::domain::{BookId, ChapterId, HighlightColor, Verse, VerseId};
use crate::error::{ReaderError, ReaderResult};
use crate::ports::ScriptureStore;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tag carried by every highlight-overlay cache entry.
pub const HIGHLIGHTS_TAG: &str = "verse-highlights";

/// The composite cache key of one verse list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VerseKey {
    pub book_id: BookId,
    pub chapter_number: u32,
    pub version: String,
}

impl VerseKey {
    pub fn new(book_id: BookId, chapter_number: u32, version: &str) -> Self {
        Self {
            book_id,
            chapter_number,
            version: version.to_string(),
        }
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "book={} chapter={} version={}", self.book_id, self.chapter_number, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HighlightKey {
    user_id: Uuid,
    chapter_id: ChapterId,
    version: String,
}

pub type HighlightMap = HashMap<VerseId, HighlightColor>;

pub struct VerseFetcher {
    store: Arc<dyn ScriptureStore>,
    verses: QueryCache<VerseKey, Arc<Vec<Verse>>>,
    highlights: QueryCache<HighlightKey, Arc<HighlightMap>>,
    /// Bumped by every `invalidate_highlights`. An overlay read that started
    /// under an older epoch must not land in the cache.
    highlight_epoch: AtomicU64,
}

impl VerseFetcher {
    pub fn new(store: Arc<dyn ScriptureStore>) -> Self {
        Self::with_policy(store, CachePolicy::default())
    }

    pub fn with_policy(store: Arc<dyn ScriptureStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            verses: QueryCache::new(policy),
            highlights: QueryCache::new(policy),
            highlight_epoch: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ScriptureStore> {
        &self.store
    }

    /// Verses of `key`, ordered by verse number.
    ///
    /// A fresh cache entry is returned without touching the store. A stale one
    /// is refetched, and served anyway if the refetch hits a store error.
    pub async fn fetch_verses(&self, key: &VerseKey) -> ReaderResult<Arc<Vec<Verse>>> {
        let stale = match self.verses.get(key) {
            Lookup::Fresh(verses) => return Ok(verses),
            Lookup::Stale(verses) => Some(verses),
            Lookup::Miss => None,
        };

        match self.load_verses(key).await {
            Ok(verses) => {
                let verses = Arc::new(verses);
                self.verses.insert(key.clone(), verses.clone(), None);
                Ok(verses)
            }
            Err(e @ ReaderError::Store { .. }) => match stale {
                Some(verses) => {
                    warn!(%key, error = %e, "Refetch failed, serving stale verses");
                    Ok(verses)
                }
                None => Err(e),
            },
            Err(e) => {
                self.verses.invalidate(key);
                Err(e)
            }
        }
    }

    async fn load_verses(&self, key: &VerseKey) -> ReaderResult<Vec<Verse>> {
        let book = self
            .store
            .get_book(key.book_id)
            .await
            .map_err(|e| ReaderError::store("get_book", key.to_string(), e))?
            .ok_or(ReaderError::BookNotFound(key.book_id))?;

        let chapter = self
            .store
            .get_chapter(key.book_id, key.chapter_number)
            .await
            .map_err(|e| ReaderError::store("get_chapter", key.to_string(), e))?
            .ok_or_else(|| ReaderError::ChapterNotFound {
                book_name: book.name.clone(),
                chapter_number: key.chapter_number,
            })?;

        let count = self
            .store
            .count_verses(chapter.id, &key.version)
            .await
            .map_err(|e| ReaderError::store("count_verses", key.to_string(), e))?;
        debug!(%key, chapter_id = chapter.id, count, "Verse count for chapter");

        let verses = self
            .store
            .get_verses(chapter.id, &key.version)
            .await
            .map_err(|e| ReaderError::store("get_verses", key.to_string(), e))?;

        if verses.is_empty() {
            return Err(ReaderError::VersionNotAvailableForChapter {
                version: key.version.clone(),
                chapter_number: key.chapter_number,
            });
        }
        Ok(verses)
    }

    /// Highlight colors the user has on `verses` (all from one chapter and
    /// translation). Verses without a highlight are absent from the map.
    pub async fn fetch_highlights(&self, user_id: Uuid, verses: &[Verse]) -> ReaderResult<Arc<HighlightMap>> {
        let Some(first) = verses.first() else {
            return Ok(Arc::new(HighlightMap::new()));
        };
        let key = HighlightKey {
            user_id,
            chapter_id: first.chapter_id,
            version: first.version.clone(),
        };
        if let Lookup::Fresh(map) = self.highlights.get(&key) {
            return Ok(map);
        }
        let epoch = self.highlight_epoch.load(Ordering::SeqCst);

        let ids: Vec<VerseId> = verses.iter().map(|v| v.id).collect();
        let rows = self.store.get_highlights(&ids, user_id).await.map_err(|e| {
            ReaderError::store(
                "get_highlights",
                format!("user={} chapter_id={} version={}", user_id, key.chapter_id, key.version),
                e,
            )
        })?;

        // Duplicate rows are tolerated; the newest one decides the color.
        let mut rows = rows;
        rows.sort_by_key(|h| (h.created_at, h.id));
        let map: HighlightMap = rows.into_iter().map(|h| (h.verse_id, h.color)).collect();
        let map = Arc::new(map);
        self.cache_overlay(key, map.clone(), epoch);
        Ok(map)
    }

    /// Drops every cached highlight overlay. Verse text stays cached.
    pub fn invalidate_highlights(&self) -> usize {
        self.highlight_epoch.fetch_add(1, Ordering::SeqCst);
        let dropped = self.highlights.invalidate_tag(HIGHLIGHTS_TAG);
        debug!(dropped, "Invalidated highlight overlays");
        dropped
    }

    pub fn prune(&self) -> usize {
        self.verses.prune() + self.highlights.prune()
    }

    /// Caches an overlay read under `epoch`, unless an invalidation happened
    /// since. An invalidation racing the insert removes it again.
    fn cache_overlay(&self, key: HighlightKey, map: Arc<HighlightMap>, epoch: u64) {
        if self.highlight_epoch.load(Ordering::SeqCst) != epoch {
            debug!(user = %key.user_id, chapter_id = key.chapter_id, "Overlay read predates an invalidation; not cached");
            return;
        }
        self.highlights.insert(key.clone(), map, Some(HIGHLIGHTS_TAG));
        if self.highlight_epoch.load(Ordering::SeqCst) != epoch {
            self.highlights.invalidate(&key);
        }
    }
}
